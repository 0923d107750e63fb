/// Assert a result is the `Err` variant, and the stringified error (including
/// its source chain) contains the given message
#[macro_export]
macro_rules! assert_err {
    ($e:expr, $msg:expr) => {{
        use itertools::Itertools as _;

        let msg = $msg;
        // Include all source errors so wrappers don't hide the important stuff
        let error: anyhow::Error = $e.unwrap_err().into();
        let actual = error.chain().map(ToString::to_string).join(": ");
        assert!(
            actual.contains(msg),
            "Expected error message to contain {msg:?}, but was: {actual:?}"
        )
    }};
}

/// Assert the given expression matches a pattern, and optionally evaluate an
/// expression with the bound pattern, e.g. to extract a field for further
/// assertions
#[macro_export]
macro_rules! assert_matches {
    ($expr:expr, $pattern:pat $(,)?) => {
        $crate::assert_matches!($expr, $pattern => ());
    };
    ($expr:expr, $pattern:pat => $output:expr $(,)?) => {
        match $expr {
            #[allow(unused_variables)]
            $pattern => $output,
            value => panic!(
                "Unexpected value {value:?} does not match pattern {expected}",
                expected = stringify!($pattern),
            ),
        }
    };
}
