//! Masking of secret values before command lines reach a log.

/// Replacement written in place of a secret.
pub const REDACTED: &str = "***";

const VALUE_FLAGS: [&str; 2] = ["--set", "--set-string"];

/// Keep the key of a `key=value` pair and mask the value.
pub fn redact_pair(pair: &str) -> String {
    match pair.split_once('=') {
        Some((key, _)) => format!("{key}={REDACTED}"),
        None => REDACTED.to_string(),
    }
}

/// Copy of `args` where every token following `--set` or `--set-string`
/// has its value masked.
pub fn redact_args<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        let arg = arg.as_ref();
        if mask_next {
            redacted.push(redact_pair(arg));
        } else {
            redacted.push(arg.to_string());
        }
        mask_next = VALUE_FLAGS.contains(&arg);
    }
    redacted
}
