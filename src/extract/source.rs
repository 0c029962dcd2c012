//! Source-code feature extraction.
//!
//! Regex tables per language pull out function names, type names, import
//! targets, and constant identifiers. The goal is the identifiers a
//! compiled artifact of the same code would expose, not a faithful parse.

use crate::features::{Feature, FeatureSet};
use crate::filetype::SourceLang;
use once_cell::sync::Lazy;
use regex::Regex;

struct LangRules {
    rules: Vec<Regex>,
}

fn rules(patterns: &[&str]) -> LangRules {
    LangRules {
        rules: patterns
            .iter()
            .map(|p| Regex::new(p).expect("static language regex"))
            .collect(),
    }
}

static C_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        // function definitions and prototypes
        r"(?m)^[A-Za-z_][\w\s\*]*?\b([A-Za-z_]\w+)\s*\([^;{]*\)\s*\{",
        r"(?m)^\s*#\s*define\s+([A-Za-z_]\w+)",
        r"(?m)^\s*#\s*include\s*[<\x22]([\w./]+)[>\x22]",
        r"\b(?:struct|union|enum)\s+([A-Za-z_]\w+)",
        r"(?m)^\s*(?:static\s+)?const\s+\w+\s+([A-Za-z_]\w+)",
    ])
});

static PYTHON_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)^\s*def\s+([A-Za-z_]\w+)",
        r"(?m)^\s*class\s+([A-Za-z_]\w+)",
        r"(?m)^\s*import\s+([\w.]+)",
        r"(?m)^\s*from\s+([\w.]+)\s+import",
        r"(?m)^([A-Z][A-Z0-9_]{3,})\s*=",
    ])
});

static JS_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)\bfunction\s+([A-Za-z_$]\w+)",
        r"(?m)\bclass\s+([A-Za-z_$]\w+)",
        r#"(?m)\brequire\s*\(\s*['"]([^'"]+)['"]"#,
        r#"(?m)\bfrom\s+['"]([^'"]+)['"]"#,
        r"(?m)\bconst\s+([A-Z][A-Z0-9_]{3,})\s*=",
        r"(?m)\b(?:interface|enum)\s+([A-Za-z_$]\w+)",
    ])
});

static JVM_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)\b(?:class|interface|enum|object)\s+([A-Za-z_]\w+)",
        r"(?m)^\s*import\s+(?:static\s+)?([\w.]+)",
        r"(?m)^\s*package\s+([\w.]+)",
        r"(?m)\b(?:public|private|protected|internal)?\s*(?:static\s+)?fun\s+([A-Za-z_]\w+)",
        r"(?m)\bstatic\s+final\s+\w+\s+([A-Z][A-Z0-9_]{3,})",
        r"(?m)\bnative\s+\w+\s+([A-Za-z_]\w+)\s*\(",
    ])
});

static GO_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)^func\s+(?:\([^)]+\)\s+)?([A-Za-z_]\w+)",
        r"(?m)^type\s+([A-Za-z_]\w+)",
        r#"(?m)^\s*\x22([\w./-]+)\x22\s*$"#, // import block entries
        r#"(?m)^\s*import\s+\x22([\w./-]+)\x22"#,
        r"(?m)^const\s+([A-Za-z_]\w+)",
    ])
});

static RUST_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)\bfn\s+([a-z_]\w+)",
        r"(?m)\b(?:struct|enum|trait)\s+([A-Za-z_]\w+)",
        r"(?m)^\s*use\s+([\w:]+)",
        r"(?m)\b(?:const|static)\s+([A-Z][A-Z0-9_]{3,})\s*:",
    ])
});

static CSHARP_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)\b(?:class|interface|struct|enum)\s+([A-Za-z_]\w+)",
        r"(?m)^\s*using\s+([\w.]+)\s*;",
        r"(?m)\bnamespace\s+([\w.]+)",
        r"(?m)\bconst\s+\w+\s+([A-Za-z_]\w+)",
    ])
});

static SWIFT_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)\bfunc\s+([A-Za-z_]\w+)",
        r"(?m)\b(?:class|struct|enum|protocol)\s+([A-Za-z_]\w+)",
        r"(?m)^\s*import\s+([A-Za-z_]\w+)",
        r"(?m)\blet\s+([A-Z][A-Za-z0-9_]{3,})\s*=",
    ])
});

static RUBY_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)^\s*def\s+(?:self\.)?([a-z_]\w+[?!]?)",
        r"(?m)^\s*(?:class|module)\s+([A-Z]\w+)",
        r#"(?m)^\s*require(?:_relative)?\s+['"]([^'"]+)['"]"#,
        r"(?m)^\s*([A-Z][A-Z0-9_]{3,})\s*=",
    ])
});

static PHP_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)\bfunction\s+([A-Za-z_]\w+)",
        r"(?m)\b(?:class|interface|trait)\s+([A-Za-z_]\w+)",
        r"(?m)^\s*use\s+([\w\\]+)\s*;",
        r#"(?m)\bdefine\s*\(\s*['"](\w+)['"]"#,
    ])
});

static OBJC_RULES: Lazy<LangRules> = Lazy::new(|| {
    rules(&[
        r"(?m)@(?:interface|implementation|protocol)\s+([A-Za-z_]\w+)",
        r"(?m)^\s*#\s*import\s*[<\x22]([\w./]+)[>\x22]",
        r"(?m)^[-+]\s*\([^)]+\)\s*([A-Za-z_]\w+)",
    ])
});

fn rules_for(lang: SourceLang) -> &'static LangRules {
    match lang {
        SourceLang::C | SourceLang::Cpp => &C_RULES,
        SourceLang::Python => &PYTHON_RULES,
        SourceLang::JavaScript | SourceLang::TypeScript => &JS_RULES,
        SourceLang::Java | SourceLang::Kotlin => &JVM_RULES,
        SourceLang::Go => &GO_RULES,
        SourceLang::Rust => &RUST_RULES,
        SourceLang::CSharp => &CSHARP_RULES,
        SourceLang::Swift => &SWIFT_RULES,
        SourceLang::Ruby => &RUBY_RULES,
        SourceLang::Php => &PHP_RULES,
        SourceLang::ObjC => &OBJC_RULES,
    }
}

/// Run the language's rule table over the file content. Capture group 1 of
/// every rule is the emitted identifier.
pub fn extract_source(lang: SourceLang, content: &str, source: Option<&str>, sink: &mut FeatureSet) {
    let table = rules_for(lang);
    for rule in &table.rules {
        for captures in rule.captures_iter(content) {
            if let Some(m) = captures.get(1) {
                let feature = match source {
                    Some(s) => Feature::with_source(m.as_str(), s),
                    None => Feature::new(m.as_str()),
                };
                sink.insert(feature);
            }
            if sink.is_full() {
                return;
            }
        }
    }
}
