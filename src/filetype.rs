//! File classification: magic-number sniff first, extension second, generic
//! binary as the last resort. Selection is final per file; the engine never
//! re-sniffs after an extractor has been chosen.

use std::fmt;
use std::path::Path;

/// Source languages the regex extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLang {
    C,
    Cpp,
    Python,
    Java,
    Kotlin,
    Go,
    Rust,
    JavaScript,
    TypeScript,
    CSharp,
    Swift,
    Ruby,
    Php,
    ObjC,
}

impl SourceLang {
    pub fn name(&self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Python => "python",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::CSharp => "csharp",
            Self::Swift => "swift",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::ObjC => "objc",
        }
    }
}

/// Compression wrapping a TAR stream (or a bare single-stream file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

/// Everything the dispatcher can route to an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Elf,
    Pe,
    MachO,
    MachOFat,
    /// `ar` static library (also the outer wrapper of .deb).
    Ar,
    Dex,
    Zip,
    Tar(Compression),
    SevenZ,
    Rar,
    Deb,
    Rpm,
    Cpio,
    /// Bare zstd single-stream (not a tar.zst).
    Zstd,
    Source(SourceLang),
    /// Anything else non-empty.
    Binary,
    Empty,
}

impl FileKind {
    /// Tag used in analysis results.
    pub fn tag(&self) -> String {
        match self {
            Self::Elf => "elf".into(),
            Self::Pe => "pe".into(),
            Self::MachO => "macho".into(),
            Self::MachOFat => "macho-fat".into(),
            Self::Ar => "ar".into(),
            Self::Dex => "dex".into(),
            Self::Zip => "zip".into(),
            Self::Tar(Compression::None) => "tar".into(),
            Self::Tar(Compression::Gzip) => "tar.gz".into(),
            Self::Tar(Compression::Bzip2) => "tar.bz2".into(),
            Self::Tar(Compression::Xz) => "tar.xz".into(),
            Self::Tar(Compression::Zstd) => "tar.zst".into(),
            Self::SevenZ => "7z".into(),
            Self::Rar => "rar".into(),
            Self::Deb => "deb".into(),
            Self::Rpm => "rpm".into(),
            Self::Cpio => "cpio".into(),
            Self::Zstd => "zstd".into(),
            Self::Source(lang) => format!("source:{}", lang.name()),
            Self::Binary => "binary".into(),
            Self::Empty => "empty".into(),
        }
    }

    /// True for native executable/library containers. Drives the
    /// native-vs-mobile context filter.
    pub fn is_native_binary(&self) -> bool {
        matches!(self, Self::Elf | Self::Pe | Self::MachO | Self::MachOFat | Self::Ar)
    }

    /// True for containers the archive walker expands.
    pub fn is_archive(&self) -> bool {
        matches!(
            self,
            Self::Zip
                | Self::Tar(_)
                | Self::SevenZ
                | Self::Deb
                | Self::Rpm
                | Self::Cpio
                | Self::Zstd
        )
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Classify file content. `path` supplies the extension fallback and the
/// `.class`-vs-fat-Mach-O disambiguation hint.
pub fn detect_file_kind(path: &Path, data: &[u8]) -> FileKind {
    if data.is_empty() {
        return FileKind::Empty;
    }
    if data.len() >= 4 {
        if let Some(kind) = sniff_magic(path, data) {
            return kind;
        }
    }
    if let Some(lang) = source_lang_for_path(path) {
        return FileKind::Source(lang);
    }
    if let Some(kind) = kind_for_extension(path) {
        return kind;
    }
    FileKind::Binary
}

fn sniff_magic(path: &Path, data: &[u8]) -> Option<FileKind> {
    if data.starts_with(b"\x7fELF") {
        return Some(FileKind::Elf);
    }
    if data.starts_with(b"MZ") {
        return Some(FileKind::Pe);
    }
    // Mach-O thin, both endiannesses, 32/64-bit.
    if data.starts_with(&[0xfe, 0xed, 0xfa, 0xce])
        || data.starts_with(&[0xfe, 0xed, 0xfa, 0xcf])
        || data.starts_with(&[0xce, 0xfa, 0xed, 0xfe])
        || data.starts_with(&[0xcf, 0xfa, 0xed, 0xfe])
    {
        return Some(FileKind::MachO);
    }
    // 0xCAFEBABE is shared by fat Mach-O and Java class files. A fat header's
    // big-endian arch count is tiny; class files put a version there.
    if data.starts_with(&[0xca, 0xfe, 0xba, 0xbe]) && data.len() >= 8 {
        let count = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let is_class = path.extension().is_some_and(|e| e == "class");
        if count < 0x40 && !is_class {
            return Some(FileKind::MachOFat);
        }
        return Some(FileKind::Binary);
    }
    if data.starts_with(b"dex\n") {
        return Some(FileKind::Dex);
    }
    if data.starts_with(b"!<arch>\n") {
        // A .deb is an ar archive whose first member is debian-binary.
        if data.len() > 8 && data[8..].starts_with(b"debian-binary") {
            return Some(FileKind::Deb);
        }
        return Some(FileKind::Ar);
    }
    if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
        return Some(FileKind::Zip);
    }
    if data.starts_with(&[0x1f, 0x8b]) {
        return Some(FileKind::Tar(Compression::Gzip));
    }
    if data.starts_with(b"BZh") {
        return Some(FileKind::Tar(Compression::Bzip2));
    }
    if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
        return Some(FileKind::Tar(Compression::Xz));
    }
    if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        // Could wrap a tar or stand alone; the walker decides after decoding.
        if path_has_tar_hint(path) {
            return Some(FileKind::Tar(Compression::Zstd));
        }
        return Some(FileKind::Zstd);
    }
    if data.starts_with(b"7z\xbc\xaf\x27\x1c") {
        return Some(FileKind::SevenZ);
    }
    if data.starts_with(b"Rar!") {
        return Some(FileKind::Rar);
    }
    if data.starts_with(&[0xed, 0xab, 0xee, 0xdb]) {
        return Some(FileKind::Rpm);
    }
    if data.starts_with(b"070701") || data.starts_with(b"070707") || data.starts_with(b"070702") {
        return Some(FileKind::Cpio);
    }
    // ustar magic sits at offset 257.
    if data.len() > 262 && &data[257..262] == b"ustar" {
        return Some(FileKind::Tar(Compression::None));
    }
    // MSI (CFB container) and xar-based PKG have no dedicated extractor;
    // treat as opaque binary rather than shelling out to host toolchains.
    if data.starts_with(&[0xd0, 0xcf, 0x11, 0xe0]) || data.starts_with(b"xar!") {
        return Some(FileKind::Binary);
    }
    None
}

fn path_has_tar_hint(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".tar.zst") || name.ends_with(".tzst")
}

fn source_lang_for_path(path: &Path) -> Option<SourceLang> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "c" | "h" => Some(SourceLang::C),
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => Some(SourceLang::Cpp),
        "py" => Some(SourceLang::Python),
        "java" => Some(SourceLang::Java),
        "kt" | "kts" => Some(SourceLang::Kotlin),
        "go" => Some(SourceLang::Go),
        "rs" => Some(SourceLang::Rust),
        "js" | "mjs" | "cjs" | "jsx" => Some(SourceLang::JavaScript),
        "ts" | "tsx" => Some(SourceLang::TypeScript),
        "cs" => Some(SourceLang::CSharp),
        "swift" => Some(SourceLang::Swift),
        "rb" => Some(SourceLang::Ruby),
        "php" => Some(SourceLang::Php),
        "m" | "mm" => Some(SourceLang::ObjC),
        _ => None,
    }
}

fn kind_for_extension(path: &Path) -> Option<FileKind> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.ends_with(".tar") {
        return Some(FileKind::Tar(Compression::None));
    }
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        return Some(FileKind::Tar(Compression::Gzip));
    }
    if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        return Some(FileKind::Tar(Compression::Bzip2));
    }
    if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        return Some(FileKind::Tar(Compression::Xz));
    }
    if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
        return Some(FileKind::Tar(Compression::Zstd));
    }
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "zip" | "jar" | "war" | "ear" | "apk" | "ipa" | "whl" | "egg" | "aar" | "nupkg" => {
            Some(FileKind::Zip)
        }
        "7z" => Some(FileKind::SevenZ),
        "rar" => Some(FileKind::Rar),
        "deb" => Some(FileKind::Deb),
        "rpm" => Some(FileKind::Rpm),
        "cpio" => Some(FileKind::Cpio),
        "a" => Some(FileKind::Ar),
        "dex" => Some(FileKind::Dex),
        _ => None,
    }
}
