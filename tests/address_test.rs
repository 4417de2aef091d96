use osckit::address::{
    contains_pattern_metasymbols, contains_reserved_symbols, match_segment, split_address,
    verify_address, Matcher,
};

#[test]
fn test_spec_pattern() {
    let matcher = Matcher::new("/foo/b?r/*").expect("valid pattern");
    assert!(matcher.match_address("/foo/bar/x").unwrap());
    assert!(matcher.match_address("/foo/bor/xyz").unwrap());
    assert!(!matcher.match_address("/foo/br/x").unwrap());
}

#[test]
fn test_literal_matching() {
    let matcher = Matcher::new("/oscillator/1/frequency").expect("valid pattern");
    assert!(matcher.match_address("/oscillator/1/frequency").unwrap());
    assert!(!matcher.match_address("/oscillator/1/phase").unwrap());
    assert!(!matcher.match_address("/oscillator/1/frequencyfoo").unwrap());
    assert!(!matcher.match_address("/prefix/oscillator/1/frequency").unwrap());
    assert!(!matcher.match_address("/oscillator/1").unwrap());
}

#[test]
fn test_idempotence_without_metasymbols() {
    for addr in ["/tempo", "/a/b/c", "/mixer/channel-2/amp_l"] {
        let matcher = Matcher::new(addr).unwrap();
        assert!(matcher.match_address(addr).unwrap(), "{addr} vs itself");
    }
}

#[test]
fn test_single_wildcard() {
    assert!(match_segment("b?r", "bar").unwrap());
    assert!(match_segment("b?r", "bor").unwrap());
    assert!(!match_segment("b?r", "br").unwrap());
    assert!(!match_segment("b?r", "baar").unwrap());
    assert!(match_segment("??", "ab").unwrap());
    assert!(!match_segment("??", "a").unwrap());
}

#[test]
fn test_star_wildcard() {
    assert!(match_segment("*", "anything123").unwrap());
    assert!(match_segment("*", "").unwrap());
    assert!(match_segment("*bar", "foobar").unwrap());
    assert!(match_segment("*bar", "foobarbar").unwrap());
    assert!(match_segment("*bar", "bar").unwrap());
    assert!(!match_segment("*bar", "barfoo").unwrap());
    assert!(match_segment("a*c", "abc").unwrap());
    assert!(match_segment("a*c", "ac").unwrap());
    assert!(!match_segment("a*c", "acb").unwrap());
    // '*' followed by '?' still requires the extra characters.
    assert!(match_segment("*??", "ab").unwrap());
    assert!(!match_segment("*??", "a").unwrap());
}

#[test]
fn test_character_classes() {
    assert!(match_segment("osc[0-9]", "osc5").unwrap());
    assert!(match_segment("osc[0-9]", "osc0").unwrap());
    assert!(match_segment("osc[0-9]", "osc9").unwrap());
    assert!(!match_segment("osc[0-9]", "osca").unwrap());
    // Reversed bounds behave like the ordered range.
    assert!(match_segment("osc[9-0]", "osc4").unwrap());
    // Multiple ranges and literal members.
    assert!(match_segment("[a-zA-Z0-9]", "G").unwrap());
    assert!(match_segment("[abc123]", "2").unwrap());
    // Negation.
    assert!(match_segment("[!0-9]", "x").unwrap());
    assert!(!match_segment("[!0-9]", "7").unwrap());
    // A dash in the last position is literal.
    assert!(match_segment("[abc-]", "-").unwrap());
}

#[test]
fn test_alternates() {
    assert!(match_segment("{foo,bar}", "foo").unwrap());
    assert!(match_segment("{foo,bar}", "bar").unwrap());
    assert!(!match_segment("{foo,bar}", "baz").unwrap());
    assert!(match_segment("x{a,b}y", "xay").unwrap());
    assert!(match_segment("x{a,b}y", "xby").unwrap());
    assert!(!match_segment("x{a,b}y", "xy").unwrap());
}

#[test]
fn test_combined_metasymbols() {
    assert!(match_segment("*[a-d]", "fooa").unwrap());
    assert!(match_segment("*[a-d]", "a").unwrap());
    assert!(!match_segment("*[a-d]", "foox").unwrap());
    assert!(match_segment("*{bar,baz}", "foobar").unwrap());
    assert!(match_segment("*{bar,baz}", "baz").unwrap());
    assert!(!match_segment("*{bar,baz}", "something").unwrap());
    assert!(match_segment("?*x", "abx").unwrap());
    assert!(!match_segment("?*x", "x").unwrap());
}

#[test]
fn test_bad_patterns() {
    assert!(Matcher::new("").is_err());
    assert!(Matcher::new("/").is_err());
    assert!(Matcher::new("//empty/parts").is_err());
    assert!(Matcher::new("/trailing/").is_err());
    assert!(Matcher::new("/{unclosed,alternative").is_err());
    assert!(Matcher::new("/unclosed/[range-").is_err());
    assert!(Matcher::new("no/leading/slash").is_err());
}

#[test]
fn test_bad_addresses() {
    let matcher = Matcher::new("/does-not-matter").unwrap();
    assert!(matcher.match_address("").is_err());
    assert!(matcher.match_address("/").is_err());
    assert!(matcher.match_address("/contains/wildcards?").is_err());
    assert!(matcher.match_address("/contains/ranges[a-z]").is_err());
    assert!(matcher.match_address("/{contains,alternative}").is_err());
    assert!(matcher.match_address("/contains a/space").is_err());
}

#[test]
fn test_symbol_queries() {
    assert!(contains_pattern_metasymbols("b?r"));
    assert!(contains_pattern_metasymbols("*"));
    assert!(contains_pattern_metasymbols("[a-z]"));
    assert!(contains_pattern_metasymbols("{a,b}"));
    assert!(!contains_pattern_metasymbols("plain"));

    assert!(contains_reserved_symbols("a/b"));
    assert!(contains_reserved_symbols("#bundle"));
    assert!(contains_reserved_symbols("with space"));
    assert!(contains_reserved_symbols("a,b"));
    assert!(!contains_reserved_symbols("plain-name_1"));
}

#[test]
fn test_split_address() {
    assert_eq!(vec!["a", "b", "c"], split_address("/a/b/c").unwrap());
    assert_eq!(vec!["single"], split_address("/single").unwrap());
    assert!(split_address("relative/path").is_err());
    assert!(split_address("/with//hole").is_err());
}

#[test]
fn test_verify_address() {
    assert!(verify_address("/oscillator/1").is_ok());
    assert!(verify_address("/osc?").is_err());
    assert!(verify_address("/white space").is_err());
    assert!(verify_address("bare").is_err());
}
