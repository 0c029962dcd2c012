//! Package-manifest feature emission for archive members.
//!
//! Recognized manifests yield structured package-identifier features
//! (`bundle-id:…`, `maven:…`, `wheel:…`) that signature corpora key on,
//! alongside whatever the raw extractors find.

use crate::features::{Feature, FeatureSet};
use tracing::debug;

/// True when the member path names a manifest this module understands.
pub fn is_recognized_manifest(relative_path: &str) -> bool {
    let lower = relative_path.to_ascii_lowercase();
    lower.ends_with("androidmanifest.xml")
        || lower.ends_with("meta-inf/manifest.mf")
        || lower.ends_with("info.plist")
        || lower.ends_with(".pom")
        || lower == "metadata"
        || lower.ends_with(".dist-info/metadata")
}

/// Parse one manifest member and emit its package identifiers. Unparseable
/// content (binary AXML, binary plists) is left to the raw string scanner.
pub fn extract_manifest(relative_path: &str, data: &[u8], sink: &mut FeatureSet) {
    let lower = relative_path.to_ascii_lowercase();
    if lower.ends_with("androidmanifest.xml") {
        extract_android_manifest(relative_path, data, sink);
    } else if lower.ends_with("meta-inf/manifest.mf") {
        extract_jar_manifest(relative_path, data, sink);
    } else if lower.ends_with("info.plist") {
        extract_plist(relative_path, data, sink);
    } else if lower.ends_with(".pom") {
        extract_pom(relative_path, data, sink);
    } else if lower == "metadata" || lower.ends_with(".dist-info/metadata") {
        extract_wheel_metadata(relative_path, data, sink);
    }
}

fn push(text: String, source: &str, sink: &mut FeatureSet) {
    sink.insert(Feature::with_source(text, source));
}

fn extract_android_manifest(source: &str, data: &[u8], sink: &mut FeatureSet) {
    let Ok(text) = std::str::from_utf8(data) else {
        debug!(source, "binary AXML manifest, leaving to string scan");
        return;
    };
    let Ok(doc) = roxmltree::Document::parse(text) else {
        debug!(source, "unparseable AndroidManifest.xml");
        return;
    };
    let root = doc.root_element();
    if let Some(package) = root.attribute("package") {
        push(format!("bundle-id:{package}"), source, sink);
        push(package.to_string(), source, sink);
    }
    // Declared activities/services carry their implementation classes.
    for node in root.descendants().filter(|n| n.is_element()) {
        if matches!(node.tag_name().name(), "activity" | "service" | "receiver" | "provider") {
            if let Some(name) = node
                .attributes()
                .find(|a| a.name() == "name")
                .map(|a| a.value())
            {
                push(name.to_string(), source, sink);
            }
        }
    }
}

fn extract_jar_manifest(source: &str, data: &[u8], sink: &mut FeatureSet) {
    let text = String::from_utf8_lossy(data);
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "Implementation-Title" | "Bundle-SymbolicName" | "Automatic-Module-Name"
            | "Main-Class" | "Bundle-Name" => {
                push(value.to_string(), source, sink);
            }
            "Implementation-Vendor" | "Bundle-Vendor" => {
                push(value.to_string(), source, sink);
            }
            _ => {}
        }
    }
}

fn extract_plist(source: &str, data: &[u8], sink: &mut FeatureSet) {
    let Ok(text) = std::str::from_utf8(data) else {
        debug!(source, "binary plist, leaving to string scan");
        return;
    };
    let Ok(doc) = roxmltree::Document::parse(text) else {
        return;
    };
    // plists are flat <key>…</key><string>…</string> sequences.
    let mut pending_key: Option<String> = None;
    for node in doc.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "key" => pending_key = node.text().map(str::to_string),
            "string" => {
                if let (Some(key), Some(value)) = (pending_key.take(), node.text()) {
                    match key.as_str() {
                        "CFBundleIdentifier" => {
                            push(format!("bundle-id:{value}"), source, sink);
                            push(value.to_string(), source, sink);
                        }
                        "CFBundleName" | "CFBundleExecutable" => {
                            push(value.to_string(), source, sink);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn extract_pom(source: &str, data: &[u8], sink: &mut FeatureSet) {
    let Ok(text) = std::str::from_utf8(data) else { return };
    let Ok(doc) = roxmltree::Document::parse(text) else { return };
    let root = doc.root_element();

    let direct_child = |name: &str| -> Option<String> {
        root.children()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
    };

    let group = direct_child("groupId");
    let artifact = direct_child("artifactId");
    let version = direct_child("version");
    if let (Some(group), Some(artifact)) = (group.as_deref(), artifact.as_deref()) {
        let coordinate = match version.as_deref() {
            Some(v) => format!("maven:{group}:{artifact}:{v}"),
            None => format!("maven:{group}:{artifact}"),
        };
        push(coordinate, source, sink);
        push(group.to_string(), source, sink);
        push(artifact.to_string(), source, sink);
    }
}

fn extract_wheel_metadata(source: &str, data: &[u8], sink: &mut FeatureSet) {
    let text = String::from_utf8_lossy(data);
    let mut name = None;
    let mut version = None;
    for line in text.lines() {
        // Headers end at the first blank line; the long description follows.
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Name:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Version:") {
            version = Some(value.trim().to_string());
        }
    }
    if let Some(name) = name {
        let tag = match version {
            Some(v) => format!("wheel:{name}:{v}"),
            None => format!("wheel:{name}"),
        };
        push(tag, source, sink);
        push(name, source, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(sink: &FeatureSet) -> Vec<String> {
        sink.iter().map(|f| f.text.clone()).collect()
    }

    #[test]
    fn recognizes_manifest_paths() {
        assert!(is_recognized_manifest("AndroidManifest.xml"));
        assert!(is_recognized_manifest("META-INF/MANIFEST.MF"));
        assert!(is_recognized_manifest("Payload/App.app/Info.plist"));
        assert!(is_recognized_manifest("META-INF/maven/org.x/y/pom.xml.pom"));
        assert!(is_recognized_manifest("numpy-1.26.dist-info/METADATA"));
        assert!(!is_recognized_manifest("lib/arm64/libx264.so"));
    }

    #[test]
    fn android_manifest_package() {
        let xml = r#"<?xml version="1.0"?>
            <manifest package="com.example.player">
              <application>
                <activity name="com.example.player.MainActivity"/>
              </application>
            </manifest>"#;
        let mut sink = FeatureSet::new(100);
        extract_manifest("AndroidManifest.xml", xml.as_bytes(), &mut sink);
        let found = texts(&sink);
        assert!(found.contains(&"bundle-id:com.example.player".to_string()));
        assert!(found.contains(&"com.example.player.MainActivity".to_string()));
    }

    #[test]
    fn binary_axml_is_skipped_quietly() {
        let mut sink = FeatureSet::new(100);
        extract_manifest("AndroidManifest.xml", &[0x03, 0x00, 0x08, 0x00, 0xff], &mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn pom_coordinates() {
        let xml = r#"<project xmlns="http://maven.apache.org/POM/4.0.0">
              <groupId>org.apache.commons</groupId>
              <artifactId>commons-compress</artifactId>
              <version>1.26.0</version>
            </project>"#;
        let mut sink = FeatureSet::new(100);
        extract_manifest("META-INF/maven/commons-compress.pom", xml.as_bytes(), &mut sink);
        let found = texts(&sink);
        assert!(found.contains(&"maven:org.apache.commons:commons-compress:1.26.0".to_string()));
    }

    #[test]
    fn plist_bundle_id() {
        let xml = r#"<?xml version="1.0"?>
            <plist version="1.0"><dict>
              <key>CFBundleIdentifier</key><string>com.example.Player</string>
              <key>CFBundleName</key><string>PlayerApp</string>
            </dict></plist>"#;
        let mut sink = FeatureSet::new(100);
        extract_manifest("Payload/Player.app/Info.plist", xml.as_bytes(), &mut sink);
        let found = texts(&sink);
        assert!(found.contains(&"bundle-id:com.example.Player".to_string()));
        assert!(found.contains(&"PlayerApp".to_string()));
    }

    #[test]
    fn wheel_metadata_name_version() {
        let metadata = "Metadata-Version: 2.1\nName: numpy\nVersion: 1.26.4\n\nNumPy is...\n";
        let mut sink = FeatureSet::new(100);
        extract_manifest("numpy-1.26.4.dist-info/METADATA", metadata.as_bytes(), &mut sink);
        assert!(texts(&sink).contains(&"wheel:numpy:1.26.4".to_string()));
    }

    #[test]
    fn jar_manifest_titles() {
        let mf = "Manifest-Version: 1.0\nImplementation-Title: commons-io\nMain-Class: org.example.Tool\n";
        let mut sink = FeatureSet::new(100);
        extract_manifest("META-INF/MANIFEST.MF", mf.as_bytes(), &mut sink);
        let found = texts(&sink);
        assert!(found.contains(&"commons-io".to_string()));
        assert!(found.contains(&"org.example.Tool".to_string()));
    }
}
