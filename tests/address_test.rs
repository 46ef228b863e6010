use osckit::address::{
    legal_address, legal_address_component, matches, valid_method_chars, Matcher,
};
use osckit::OscError;

#[test]
fn test_matcher_literals() {
    let matcher = Matcher::new("/oscillator/1/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/1/frequency"));
    assert!(!matcher.matches("/oscillator/1/phase"));
    assert!(!matcher.matches("/oscillator/1/frequencyfoo"));
    assert!(!matcher.matches("/prefix/oscillator/1/frequency"));
    // A literal pattern matches exactly itself and nothing else.
    assert!(!matcher.matches("/oscillator/1"));
    assert!(!matcher.matches("/oscillator/1/frequency/overtone"));
}

#[test]
fn test_matcher_choice() {
    let matcher = Matcher::new("/foo{bar,baz}").expect("valid pattern");
    assert!(matcher.matches("/foobar"));
    assert!(matcher.matches("/foobaz"));
    assert!(!matcher.matches("/foobag"));

    let matcher = Matcher::new("/foo{bar,baz,tron}").expect("valid pattern");
    assert!(matcher.matches("/footron"));

    let matcher = Matcher::new("/a/{x,yy}").expect("valid pattern");
    assert!(matcher.matches("/a/yy"));
    assert!(matcher.matches("/a/x"));
    assert!(!matcher.matches("/a/y"));
}

#[test]
fn test_matcher_character_class() {
    let matcher = Matcher::new("/oscillator/[0-9]").expect("valid pattern");
    assert!(matcher.matches("/oscillator/0")); // Beginning of range included
    assert!(matcher.matches("/oscillator/6")); // Middle of range
    assert!(matcher.matches("/oscillator/9")); // Last member of range included
    assert!(!matcher.matches("/oscillator/a"));
    assert!(!matcher.matches("/oscillator/10")); // One character only

    // Inverted order should work too
    let matcher = Matcher::new("/oscillator/[9-0]").expect("valid pattern");
    assert!(matcher.matches("/oscillator/0"));
    assert!(matcher.matches("/oscillator/6"));
    assert!(matcher.matches("/oscillator/9"));

    // Multiple ranges
    let matcher = Matcher::new("/oscillator/[a-zA-Z0-9]").expect("valid pattern");
    assert!(matcher.matches("/oscillator/0"));
    assert!(matcher.matches("/oscillator/a"));
    assert!(matcher.matches("/oscillator/A"));

    // Plain listed characters
    let matcher = Matcher::new("/a/[bc]").expect("valid pattern");
    assert!(matcher.matches("/a/b"));
    assert!(matcher.matches("/a/c"));
    assert!(!matcher.matches("/a/d"));

    // Negated range
    let matcher = Matcher::new("/oscillator/[!0-9]").expect("valid pattern");
    assert!(!matcher.matches("/oscillator/1"));
    assert!(matcher.matches("/oscillator/a"));

    // Trailing dash has no special meaning
    let matcher = Matcher::new("/oscillator/[abcd-]").expect("valid pattern");
    assert!(matcher.matches("/oscillator/a"));
    assert!(matcher.matches("/oscillator/-"));
}

#[test]
fn test_matcher_single_wildcard() {
    let matcher = Matcher::new("/oscillator/?/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/1/frequency"));
    assert!(matcher.matches("/oscillator/F/frequency"));
    assert!(!matcher.matches("/oscillator//frequency"));
    assert!(!matcher.matches("/oscillator/10/frequency"));

    // Two consecutive single wildcards match exactly two characters
    let matcher = Matcher::new("/oscillator/??/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/10/frequency"));
    assert!(!matcher.matches("/oscillator/1/frequency"));

    // Surrounded by literals
    let matcher = Matcher::new("/oscillator/prefixed?postfixed/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/prefixed1postfixed/frequency"));
    assert!(!matcher.matches("/oscillator/prefixedpostfixed/frequency"));
}

#[test]
fn test_matcher_wildcard() {
    let matcher = Matcher::new("/foo/*").expect("valid pattern");
    assert!(matcher.matches("/foo/bar"));
    // '*' stays within its own segment.
    assert!(!matcher.matches("/foo/bar/baz"));

    let matcher = Matcher::new("/oscillator/*/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/anything123/frequency"));
    assert!(!matcher.matches("/oscillator/extra/part/frequency"));
    assert!(!matcher.matches("/oscillator//frequency"));

    // With a literal tail
    let matcher = Matcher::new("/oscillator/*bar/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/foobar/frequency"));
    assert!(matcher.matches("/oscillator/foobarbar/frequency"));
    assert!(matcher.matches("/oscillator/bar/frequency"));
    assert!(!matcher.matches("/oscillator/foo/frequency"));

    // Consecutive stars collapse into one
    let matcher = Matcher::new("/oscillator/**/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/x/frequency"));
    assert!(!matcher.matches("/oscillator/x/y/frequency"));

    // Mix with character class
    let matcher = Matcher::new("/oscillator/*[a-d]/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/a/frequency"));
    assert!(matcher.matches("/oscillator/fooa/frequency"));
    assert!(!matcher.matches("/oscillator/foox/frequency"));

    // Mix with choice
    let matcher = Matcher::new("/oscillator/*{bar,baz}/frequency").expect("valid pattern");
    assert!(matcher.matches("/oscillator/foobar/frequency"));
    assert!(matcher.matches("/oscillator/baz/frequency"));
    assert!(!matcher.matches("/oscillator/something/frequency"));
}

#[test]
fn test_matches_helper() {
    assert!(matches("/foo/*", "/foo/bar").unwrap());
    assert!(!matches("/foo/*", "/foo/bar/baz").unwrap());
    assert!(matches("/a/[bc]", "/a/b").unwrap());
    assert!(matches("/a/{x,yy}", "/a/yy").unwrap());
    assert!(matches!(
        matches("no-slash", "/a"),
        Err(OscError::IllegalPattern(_))
    ));
}

#[test]
fn test_allowed_literal_characters() {
    let all = "/!\"$%&'()+-.0123456789:;<=>@ABCDEFGHIJKLMNOPQRSTUVWXYZ^_`abcdefghijklmnopqrstuvwxyz|~";
    let matcher = Matcher::new(all).expect("valid pattern");
    assert!(matcher.matches(all));
}

#[test]
fn test_bad_patterns() {
    for pattern in [
        "",
        "/",
        "no-slash",
        "//empty/parts/",
        "////",
        "/{unclosed,alternative",
        "/unclosed/[range-",
        "/spaces are illegal",
    ] {
        assert!(
            matches!(Matcher::new(pattern), Err(OscError::IllegalPattern(_))),
            "pattern {:?} should not compile",
            pattern
        );
    }
}

#[test]
fn test_illegal_method_addresses_never_match() {
    let matcher = Matcher::new("/does-not-matter").expect("valid pattern");
    for addr in [
        "",
        "/",
        "no-slash",
        "/contains/wildcards?",
        "/contains/wildcards*",
        "/contains/ranges[a-z]",
        "/{contains,alternative}",
        "/trailing/",
    ] {
        assert!(!matcher.matches(addr), "address {:?} should not match", addr);
    }
}

#[test]
fn test_method_char_helpers() {
    let chars = valid_method_chars();
    assert!(chars.contains('a') && chars.contains('0') && chars.contains('_'));
    for reserved in "# *,/?[]{}".chars() {
        assert!(!chars.contains(reserved), "{:?} must be reserved", reserved);
    }

    assert!(legal_address_component("tempo"));
    assert!(!legal_address_component("tem po"));
    assert!(!legal_address_component(""));

    assert!(legal_address("/composite/address/1"));
    assert!(!legal_address("composite"));
    assert!(!legal_address("/composite//address"));
}
