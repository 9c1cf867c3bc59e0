//! File wrapper types and ingest utilities.

use std::{borrow::Cow, fs, io, path::Path, sync::Arc};

/// Creates a fake [`SourceFile`] with the given relative path and contents.
#[cfg(test)]
#[macro_export]
macro_rules! fake_file {
    ($rel:expr, $s:expr) => {
        $crate::source_file::SourceFile::fake($rel, String::from($s))
    };
}

/// How the bytes of a file map to the text the lexer sees.
///
/// PHP source is a byte string, and string literals in older packages are
/// often Latin-1. Files that are not valid UTF-8 are read byte for byte, with
/// each byte becoming the code point of the same value, and mapped back the
/// same way when written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Bytes,
}

impl Encoding {
    /// Decodes `bytes` without loss.
    pub fn decode(bytes: Vec<u8>) -> (String, Encoding) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, Encoding::Utf8),
            Err(error) => {
                let text = error.as_bytes().iter().map(|&b| char::from(b)).collect();
                (text, Encoding::Bytes)
            }
        }
    }

    /// Encodes `text` back into the bytes it was decoded from. In a
    /// [`Encoding::Bytes`] file, characters above U+00FF can only come from
    /// names declared in other files, and are written as UTF-8.
    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        match self {
            Encoding::Utf8 => Cow::Borrowed(text.as_bytes()),
            Encoding::Bytes => {
                let mut bytes = Vec::with_capacity(text.len());
                for c in text.chars() {
                    match u8::try_from(c) {
                        Ok(b) => bytes.push(b),
                        Err(_) => {
                            let mut buf = [0; 4];
                            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        }
                    }
                }
                Cow::Owned(bytes)
            }
        }
    }
}

/// Reads the file at `path` with [`Encoding::decode`].
pub fn read(path: &Path) -> io::Result<(String, Encoding)> {
    Ok(Encoding::decode(fs::read(path)?))
}

/// A PHP source file belonging to a located package.
///
/// Source files are relatively cheap to clone, since they store their
/// contents as an `Arc<str>`. The most expensive part of the clone impl is
/// therefore usually the copying of the two paths.
#[derive(Clone)]
pub struct SourceFile {
    /// Absolute path on disk.
    path: Box<Path>,
    /// Path relative to the package root, which is also the path relative to
    /// the package directory in the output tree.
    relative: Box<Path>,
    contents: Arc<str>,
    encoding: Encoding,
}

impl SourceFile {
    pub fn new(
        path: impl Into<Box<Path>>,
        relative: impl Into<Box<Path>>,
    ) -> io::Result<Self> {
        let path = path.into();
        let relative = relative.into();
        let (contents, encoding) = read(&path)?;

        Ok(Self {
            path,
            relative,
            contents: contents.into(),
            encoding,
        })
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Creates a fake file with the given relative path and contents.
    ///
    /// Prefer using the [`fake_file!`] macro.
    #[allow(unused)]
    pub(crate) fn fake(
        relative: impl AsRef<Path>,
        contents: impl Into<Arc<str>>,
    ) -> Self {
        let relative: Box<Path> = relative.as_ref().into();
        let path = Path::new("/fake").join(&relative).into_boxed_path();
        let contents = contents.into();

        Self {
            path,
            relative,
            contents,
            encoding: Encoding::Utf8,
        }
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let contents =
            format!("... {{{:.3}KiB}}", (self.contents.len() as f64) / 1024f64);
        f.debug_struct("File")
            .field("path", &self.path)
            .field("relative", &self.relative)
            .field("contents", &contents)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_files_live_under_a_fake_root() {
        let file = fake_file!("src/Client.php", "<?php\n");
        assert_eq!(file.relative(), Path::new("src/Client.php"));
        assert_eq!(file.path(), Path::new("/fake/src/Client.php"));
        assert_eq!(file.contents(), "<?php\n");
    }

    #[test]
    fn non_utf8_files_round_trip() {
        let bytes = b"<?php\nconst NAME = 'Caf\xe9';\n".to_vec();
        let (text, encoding) = Encoding::decode(bytes.clone());
        assert_eq!(encoding, Encoding::Bytes);
        assert_eq!(text, "<?php\nconst NAME = 'Caf\u{e9}';\n");
        assert_eq!(encoding.encode(&text), bytes);

        let (text, encoding) = Encoding::decode("<?php echo 'Café';".into());
        assert_eq!(encoding, Encoding::Utf8);
        assert_eq!(encoding.encode(&text), "<?php echo 'Café';".as_bytes());
    }

    #[test]
    fn files_are_read_as_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Latin.php");
        fs::write(&path, b"<?php // \xff\n").unwrap();

        let file = SourceFile::new(path, Path::new("Latin.php")).unwrap();
        assert_eq!(file.encoding(), Encoding::Bytes);
        assert_eq!(file.contents(), "<?php // \u{ff}\n");
    }

    #[test]
    fn debug_impl_hides_contents() {
        let file = fake_file!("a.php", "<?php echo 'secret';");
        let debug = format!("{file:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("KiB"));
    }
}
