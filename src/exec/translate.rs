//! Host-to-guest path translation for delegated toolchains.
//!
//! A drive-rooted host path such as `C:\Users\me\kc\input.kt` becomes
//! `/mnt/c/Users/me/kc/input.kt` under the default mount root. Anything that
//! does not look drive-rooted is treated as already being in the guest
//! namespace and only has its separators normalised.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTranslator {
    mount_root: String,
}

impl Default for PathTranslator {
    fn default() -> Self {
        Self::new("/mnt")
    }
}

impl PathTranslator {
    pub fn new(mount_root: impl Into<String>) -> Self {
        let mount_root = mount_root.into();
        let trimmed = mount_root.trim_end_matches('/');
        Self {
            mount_root: trimmed.to_string(),
        }
    }

    /// Translate a host-native path string into the guest namespace.
    pub fn to_guest(&self, native: &str) -> String {
        let normalized = native.replace('\\', "/");
        match split_drive(&normalized) {
            Some((drive, rest)) => {
                format!("{}/{}/{}", self.mount_root, drive.to_ascii_lowercase(), rest)
            }
            None => normalized,
        }
    }

    pub fn path_to_guest(&self, native: &Path) -> String {
        self.to_guest(&native.to_string_lossy())
    }
}

/// `X:/rest` -> `(X, rest)`
fn split_drive(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    let drive = chars.next().filter(|c| c.is_ascii_alphabetic())?;
    if chars.next() != Some(':') || chars.next() != Some('/') {
        return None;
    }
    // drive letter, colon and slash are all single-byte
    Some((drive, &path[3..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translates_drive_paths() {
        let t = PathTranslator::default();
        assert_eq!(
            t.to_guest(r"C:\Users\ana\Kotlin-Compiler\tmp-1\input.kt"),
            "/mnt/c/Users/ana/Kotlin-Compiler/tmp-1/input.kt"
        );
        assert_eq!(t.to_guest("d:/work/input.s"), "/mnt/d/work/input.s");
        assert_eq!(t.to_guest("E:/"), "/mnt/e/");
    }

    #[test]
    fn test_guest_paths_pass_through() {
        let t = PathTranslator::default();
        assert_eq!(t.to_guest("/mnt/c/work/input.s"), "/mnt/c/work/input.s");
        assert_eq!(t.to_guest("/home/ana/input.kt"), "/home/ana/input.kt");
        assert_eq!(t.to_guest("relative/input.kt"), "relative/input.kt");
        assert_eq!(t.to_guest("-no-pie"), "-no-pie");
    }

    #[test]
    fn test_unrecognised_roots_are_not_translated() {
        let t = PathTranslator::default();
        // no separator after the colon
        assert_eq!(t.to_guest("C:input.kt"), "C:input.kt");
        // not a single drive letter
        assert_eq!(t.to_guest("CD:/x"), "CD:/x");
        assert_eq!(t.to_guest("1:/x"), "1:/x");
        assert_eq!(t.to_guest(""), "");
        // UNC shares only get separators normalised
        assert_eq!(t.to_guest(r"\\server\share\f"), "//server/share/f");
    }

    #[test]
    fn test_translation_is_idempotent() {
        let t = PathTranslator::default();
        for native in [r"C:\a\b.kt", "z:/x/y", "/already/guest", r"rel\path"] {
            let once = t.to_guest(native);
            assert_eq!(t.to_guest(&once), once, "not idempotent for {native}");
        }
    }

    #[test]
    fn test_custom_mount_root() {
        let t = PathTranslator::new("/host/");
        assert_eq!(t.to_guest(r"C:\x"), "/host/c/x");
        assert_eq!(t, PathTranslator::new("/host"));
    }
}
