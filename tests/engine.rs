use rstest::rstest;
use tinyregex::{compile, Error};

#[rstest]
// plain sequences
#[case("ab", "ab", Some((0, 2)))]
#[case("ab", "aab", Some((1, 2)))]
#[case("ab", "aaab", Some((2, 2)))]
#[case("ab", "ccab", Some((2, 2)))]
#[case("ab", "a", None)]
#[case("ab", "b", None)]
// bracket classes
#[case("[ab]", "a", Some((0, 1)))]
#[case("[ab]", "b", Some((0, 1)))]
#[case("[ab]", "c", None)]
#[case("[ab][cd]", "ac", Some((0, 2)))]
#[case("[ab][cd]", "bd", Some((0, 2)))]
#[case("[ab][cd]", "ab", None)]
#[case("[ab][cd]", "cd", None)]
#[case("[ab][cd]", "abcd", Some((1, 2)))]
#[case("[ab][cd]", "badc", Some((1, 2)))]
#[case("[a-c]", "b", Some((0, 1)))]
#[case("[a-c]", "d", None)]
#[case("[^a-c]", "abcd", Some((3, 1)))]
#[case("[^a-c]", "abc", None)]
// groups
#[case("a(bcd)e", "abcde", Some((0, 5)))]
#[case("a(bcd)e", "abe", None)]
#[case("a(bcd)e", "ace", None)]
// optional
#[case("a?b", "ab", Some((0, 2)))]
#[case("a?b", "b", Some((0, 1)))]
#[case("a?b", "cb", Some((1, 1)))]
#[case("colou?r", "color", Some((0, 5)))]
#[case("colou?r", "colour", Some((0, 6)))]
#[case("colou?r", "colur", None)]
#[case("a(bcd)?e", "abcde", Some((0, 5)))]
#[case("a(bcd)?e", "ae", Some((0, 2)))]
#[case("a(bcd)?e", "abe", None)]
#[case("a(ebcd)?e", "ae", Some((0, 2)))]
#[case("a(ebcd)?e", "aebcde", Some((0, 6)))]
#[case("a(ebcd)?e", "abcde", None)]
#[case("a(ebcd)?e", "aebde", Some((0, 2)))]
// zero-or-more
#[case("[abc]*@[def]*", "@", Some((0, 1)))]
#[case("[abc]*@[def]*", "aaabbac@fededf", Some((0, 14)))]
#[case("[abc]*@[def]*", "aabbacd@afededf", Some((7, 1)))]
#[case("[ab]*@[cd]*", "aabbacd@afededf", Some((7, 1)))]
#[case("a*", "", Some((0, 0)))]
#[case("a*", "a", Some((0, 1)))]
#[case("a*", "b", Some((0, 0)))]
#[case("a*a", "", None)]
#[case("a*a", "a", Some((0, 1)))]
#[case("a*a", "aa", Some((0, 2)))]
#[case("a*a", "aaa", Some((0, 3)))]
#[case("a*a", "aaaa", Some((0, 4)))]
// one-or-more
#[case("[abc]+@[def]+", "@", None)]
#[case("[abc]+@[def]+", "a@f", Some((0, 3)))]
#[case("[abc]+@[def]+", "aaabbac@fededf", Some((0, 14)))]
#[case("[abc]+@[def]+", "aabbacd@afededf", None)]
#[case("a+", "", None)]
#[case("a+", "a", Some((0, 1)))]
#[case("a+a", "a", None)]
#[case("a+a", "aa", Some((0, 2)))]
#[case("a+a", "aaaa", Some((0, 4)))]
// optional boundaries
#[case("a?", "", Some((0, 0)))]
#[case("a?", "a", Some((0, 1)))]
#[case("a?", "b", Some((0, 0)))]
#[case("a?a", "", None)]
#[case("a?a", "a", Some((0, 1)))]
#[case("a?a", "aa", Some((0, 2)))]
// alternation: first branch wins when it can match
#[case("a|ab", "ab", Some((0, 1)))]
#[case("ab|a", "ab", Some((0, 2)))]
#[case("cat|dog", "hotdog", Some((3, 3)))]
#[case("cat|dog", "cow", None)]
#[case("a|b|c", "zzc", Some((2, 1)))]
// anchors
#[case("^abc$", "abc", Some((0, 3)))]
#[case("^abc$", "abcd", None)]
#[case("^abc$", "zabc", None)]
#[case("^abc$", "abc\n", None)]
#[case("^ab", "ab", Some((0, 2)))]
#[case("^ab", "cab", None)]
#[case("ab$", "cab", Some((1, 2)))]
#[case("ab$", "abc", None)]
#[case("^(a|b)c*$", "acc", Some((0, 3)))]
#[case("^(a|b)c*$", "bbc", None)]
// dot
#[case("a.c", "axc", Some((0, 3)))]
#[case("a.c", "ac", None)]
// escapes
#[case(r"\d", "ab1", Some((2, 1)))]
#[case(r"\d", "abc", None)]
#[case(r"\D", "12a", Some((2, 1)))]
#[case(r"\w+", "--ab_1--", Some((2, 4)))]
#[case(r"\s", "a b", Some((1, 1)))]
#[case(r"\S+", "  ab ", Some((2, 2)))]
#[case(r"a\.b", "a.b", Some((0, 3)))]
#[case(r"a\.b", "axb", None)]
// lazy quantifiers
#[case("a*?", "aaa", Some((0, 0)))]
#[case("a+?", "aaa", Some((0, 1)))]
#[case("a??", "a", Some((0, 0)))]
#[case("<.+?>", "<ab><c>", Some((0, 4)))]
#[case("<.+>", "<ab><c>", Some((0, 7)))]
fn try_match(
    #[case] pattern: &str,
    #[case] text: &str,
    #[case] expected: Option<(usize, usize)>,
) {
    let program = compile(pattern)
        .unwrap_or_else(|e| panic!("pattern {pattern:?} should compile: {e}"));
    let found = program.match_from(text, 0).unwrap();
    assert_eq!(
        found.as_ref().map(|m| (m.start(), m.len())),
        expected,
        "pattern {pattern:?} on {text:?}"
    );
    if let Some(found) = found {
        assert!(found.end() <= text.chars().count());
    }
    assert_eq!(program.matches(text, 0), expected.is_some());
}

#[rstest]
#[case("")]
#[case("*")]
#[case("?")]
#[case("+")]
#[case("*+")]
#[case("a(*)")]
#[case("a(+)")]
#[case("a(?)")]
#[case("abcde)")]
#[case(r"a(bcd\)e")]
#[case(r"a\(bcd)e")]
#[case(r"a(b(c\)d)e")]
#[case(r"a(b\(c)d)e")]
#[case(r"a[bc\]d")]
#[case(r"a\[bc]d")]
#[case("a[[bc]d")]
#[case("a[[bc]]d")]
#[case("a[bc]]d")]
#[case("a|b)")]
#[case("(a|b")]
fn malformed_patterns_do_not_compile(#[case] pattern: &str) {
    assert!(compile(pattern).is_err(), "{pattern:?} should not compile");
}

#[test]
fn empty_pattern_error() {
    assert_eq!(compile("").unwrap_err(), Error::EmptyPattern);
}

#[test]
fn match_from_respects_the_start_offset() {
    let program = compile("ab").unwrap();
    let found = program.match_from("abab", 1).unwrap().unwrap();
    assert_eq!((found.start(), found.len()), (2, 2));
    assert!(program.match_from("abab", 3).unwrap().is_none());
}

#[test]
fn match_from_at_text_length_is_valid() {
    let program = compile("a*").unwrap();
    let found = program.match_from("ab", 2).unwrap().unwrap();
    assert_eq!((found.start(), found.len()), (2, 0));
}

#[test]
fn match_from_past_text_length_is_an_error() {
    let program = compile("a").unwrap();
    assert_eq!(
        program.match_from("abc", 4).unwrap_err(),
        Error::StartOutOfRange { start: 4, len: 3 }
    );
}

#[test]
fn offsets_are_character_offsets() {
    let program = compile("é").unwrap();
    let found = program.match_from("café", 0).unwrap().unwrap();
    assert_eq!((found.start(), found.len()), (3, 1));
    assert_eq!(found.region().text_in("café"), "é");
}

#[test]
fn capture_groups_record_their_spans() {
    let program = compile("(a+)(b+)").unwrap();
    let found = program.match_from("xaabbb", 0).unwrap().unwrap();
    assert_eq!((found.start(), found.len()), (1, 5));
    // group 0 is the whole match
    assert_eq!(found.group(0), Some(found.region()));
    assert_eq!(found.group(1).unwrap().text_in("xaabbb"), "aa");
    assert_eq!(found.group(2).unwrap().text_in("xaabbb"), "bbb");
    assert_eq!(found.group(3), None);
}

#[test]
fn capture_wraps_a_whole_alternation() {
    let program = compile("(a|b)c").unwrap();
    let found = program.match_from("zbc", 0).unwrap().unwrap();
    assert_eq!(found.group(1).unwrap().text_in("zbc"), "b");
}

#[test]
fn captures_update_as_quantified_groups_backtrack() {
    let program = compile("(a+)a").unwrap();
    let found = program.match_from("aa", 0).unwrap().unwrap();
    assert_eq!((found.start(), found.len()), (0, 2));
    assert_eq!(found.group(1).unwrap().text_in("aa"), "a");
}

#[test]
fn matches_all_yields_sequential_matches() {
    let program = compile("ab").unwrap();
    let spans: Vec<_> = program
        .matches_all("xababab", 0)
        .map(|m| (m.start(), m.len()))
        .collect();
    assert_eq!(spans, vec![(1, 2), (3, 2), (5, 2)]);
}

#[test]
fn matches_all_never_overlaps() {
    let program = compile("a+").unwrap();
    let mut previous_end = 0;
    for found in program.matches_all("aabaa", 0) {
        assert!(found.start() >= previous_end);
        previous_end = found.end();
    }
    let spans: Vec<_> = program
        .matches_all("aabaa", 0)
        .map(|m| (m.start(), m.len()))
        .collect();
    assert_eq!(spans, vec![(0, 2), (3, 2)]);
}

#[test]
fn matches_all_terminates_on_empty_matches() {
    let program = compile("a*").unwrap();
    let spans: Vec<_> = program
        .matches_all("bb", 0)
        .map(|m| (m.start(), m.len()))
        .collect();
    assert_eq!(spans, vec![(0, 0), (1, 0), (2, 0)]);
}

#[test]
fn matches_all_can_start_mid_text() {
    let program = compile("ab").unwrap();
    let spans: Vec<_> = program
        .matches_all("abab", 1)
        .map(|m| (m.start(), m.len()))
        .collect();
    assert_eq!(spans, vec![(2, 2)]);
}

#[test]
fn programs_are_shared_across_threads() {
    let program = compile("[a-c]+x").unwrap();
    std::thread::scope(|scope| {
        let program = &program;
        for text in ["aabx", "zzz", "cx", "x"] {
            scope.spawn(move || {
                let by_find = program.match_from(text, 0).unwrap().is_some();
                assert_eq!(program.matches(text, 0), by_find);
            });
        }
    });
}

const SEMVER: &str = concat!(
    r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)",
    r"(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)",
    r"(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?",
    r"(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
);

#[rstest]
#[case("1.0.0", Some(5))]
#[case("10.20.30", Some(8))]
#[case("1.0.0-alpha", Some(11))]
#[case("1.0.0-alpha.1", Some(13))]
#[case("1.0.0-alpha+beta", Some(16))]
#[case("1.2.3-rc.1+build5", Some(17))]
#[case("01.1.1", None)]
#[case("1.1", None)]
#[case("1.0.0-", None)]
#[case("1.0.0+", None)]
fn semver_grammar(#[case] text: &str, #[case] expected_len: Option<usize>) {
    let program = compile(SEMVER).unwrap();
    let found = program.match_from(text, 0).unwrap();
    assert_eq!(
        found.map(|m| {
            assert_eq!(m.start(), 0);
            m.len()
        }),
        expected_len,
        "{text:?}"
    );
}

#[test]
fn semver_captures_each_component() {
    let text = "1.2.3-rc.1+build5";
    let found = compile(SEMVER)
        .unwrap()
        .match_from(text, 0)
        .unwrap()
        .unwrap();
    assert_eq!(found.group(1).unwrap().text_in(text), "1");
    assert_eq!(found.group(2).unwrap().text_in(text), "2");
    assert_eq!(found.group(3).unwrap().text_in(text), "3");
    assert_eq!(found.group(4).unwrap().text_in(text), "rc.1");
    assert_eq!(found.group(5).unwrap().text_in(text), "build5");
}

#[test]
fn disassembly_resolves_jump_targets() {
    let listing = compile("a|b").unwrap().disassemble();
    assert!(listing.contains("Switch"), "{listing}");
    assert!(listing.contains('['), "{listing}");
    assert!(!listing.contains("<partial"), "{listing}");
}
