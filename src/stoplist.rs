//! Curated stop set of generic programming tokens.
//!
//! Shared by the pattern validator (ingest) and the feature normalizer
//! (analysis): a pattern or feature equal to one of these tokens carries no
//! discriminating signal on its own. Tokens with an underscore or non-ASCII
//! byte are exempt at normalization time, so library prefixes like `av_`
//! survive while bare `init` does not.

use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;

/// Generic identifiers, common C stdlib names, and primitive-adjacent words.
pub static STOP_WORDS: &[&str] = &[
    // Lifecycle and state
    "init", "exit", "open", "close", "start", "stop", "begin", "end", "create",
    "destroy", "reset", "clear", "setup", "cleanup", "update", "check", "valid",
    // Data access
    "read", "write", "get", "set", "add", "remove", "delete", "insert", "find",
    "search", "sort", "copy", "move", "compare", "load", "save", "parse",
    "format", "encode", "decode", "convert", "filter", "merge", "split", "join",
    // Structures
    "buffer", "array", "list", "map", "vector", "queue", "stack", "tree",
    "string", "node", "item", "element", "value", "key", "data", "object",
    "handle", "context", "cache", "pool", "channel", "stream",
    // Diagnostics
    "error", "debug", "info", "warn", "fatal", "trace", "log", "print",
    "throw", "catch",
    // Memory and C stdlib
    "alloc", "free", "malloc", "calloc", "realloc", "memcpy", "memset",
    "strlen", "strcpy", "strcmp", "sprintf", "snprintf", "printf",
    // Concurrency
    "lock", "unlock", "mutex", "thread", "process", "signal",
    // Networking
    "connect", "send", "receive", "client", "server", "host", "port", "socket",
    "address",
    // Misc nouns
    "file", "path", "name", "type", "mode", "flag", "option", "config", "count",
    "size", "length", "index", "offset", "result", "input", "output", "status",
    "version", "test", "true", "false", "null", "none", "empty", "bool",
    "common",
];

static STOP_SET: Lazy<FxHashSet<&'static str>> =
    Lazy::new(|| STOP_WORDS.iter().copied().collect());

/// Primitive type names are rejected outright at ingest.
pub static PRIMITIVE_TYPES: &[&str] = &[
    "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32", "uint64",
    "float32", "float64", "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t",
    "uint16_t", "uint32_t", "uint64_t", "size_t", "ssize_t", "wchar_t",
    "double", "float", "char", "short", "long", "signed", "unsigned", "void",
];

/// True when `token` (case-folded) is in the curated stop set.
pub fn is_stop_word(token: &str) -> bool {
    STOP_SET.contains(token.to_ascii_lowercase().as_str())
}

/// True when `token` names a primitive type.
pub fn is_primitive_type(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    PRIMITIVE_TYPES.iter().any(|p| *p == lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_words_are_case_folded() {
        assert!(is_stop_word("init"));
        assert!(is_stop_word("INIT"));
        assert!(is_stop_word("Buffer"));
        assert!(!is_stop_word("av_register_all"));
    }

    #[test]
    fn primitives_detected() {
        assert!(is_primitive_type("int32"));
        assert!(is_primitive_type("uint64_t"));
        assert!(!is_primitive_type("png_uint_32"));
    }

    #[test]
    fn set_has_expected_scale() {
        // The curated set stays around 120 generic tokens.
        assert!(STOP_WORDS.len() >= 110 && STOP_WORDS.len() <= 160);
    }
}
