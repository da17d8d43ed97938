//! Reading and writing documents with encoding detection.
//!
//! Files load as a whole: the bytes are sniffed for binary content,
//! their encoding detected, and the decoded text becomes a rope. The
//! detected encoding and line ending are remembered so saving writes the
//! file back the way it was found.

use std::{
  fs,
  io::Write,
  path::Path,
};

use chardetng::EncodingDetector;
use encoding_rs::{
  Encoding,
  UTF_8,
};
use ropey::Rope;
use thiserror::Error;

use jot_core::line_ending::{
  LineEnding,
  NATIVE_LINE_ENDING,
  auto_detect_line_ending,
};

pub type Result<T> = std::result::Result<T, IoError>;

/// How many leading bytes to inspect when deciding whether a file is
/// binary.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum IoError {
  #[error("failed to read {path}: {source}")]
  Read {
    path:   String,
    source: std::io::Error,
  },
  #[error("failed to write {path}: {source}")]
  Write {
    path:   String,
    source: std::io::Error,
  },
  #[error("{path} looks like a binary file")]
  Binary { path: String },
}

/// A document freshly loaded from disk.
#[derive(Debug)]
pub struct LoadedFile {
  pub text:        Rope,
  /// On-disk size, in bytes. Drives mode selection.
  pub size_bytes:  u64,
  pub encoding:    &'static Encoding,
  pub line_ending: LineEnding,
}

/// Load `path`, refusing binary files and decoding legacy encodings to
/// UTF-8.
pub fn load(path: &Path) -> Result<LoadedFile> {
  let bytes = fs::read(path).map_err(|source| IoError::Read {
    path: path.display().to_string(),
    source,
  })?;
  let size_bytes = bytes.len() as u64;

  if is_binary(&bytes) {
    return Err(IoError::Binary {
      path: path.display().to_string(),
    });
  }

  let encoding = detect_encoding(&bytes);
  let (decoded, actual_encoding, had_errors) = encoding.decode(&bytes);
  if had_errors {
    tracing::warn!(
      path = %path.display(),
      encoding = actual_encoding.name(),
      "malformed bytes replaced during decode"
    );
  }

  let text = Rope::from_str(&decoded);
  let line_ending = auto_detect_line_ending(&text).unwrap_or(NATIVE_LINE_ENDING);
  tracing::debug!(
    path = %path.display(),
    size_bytes,
    encoding = actual_encoding.name(),
    "loaded file"
  );

  Ok(LoadedFile {
    text,
    size_bytes,
    encoding: actual_encoding,
    line_ending,
  })
}

/// Write `text` to `path` in `encoding`.
pub fn save(path: &Path, text: &Rope, encoding: &'static Encoding) -> Result<()> {
  let mut file = fs::File::create(path).map_err(|source| write_err(path, source))?;

  if encoding == UTF_8 {
    // Chunks are already valid UTF-8; no transcoding pass needed.
    for chunk in text.chunks() {
      file
        .write_all(chunk.as_bytes())
        .map_err(|source| write_err(path, source))?;
    }
  } else {
    let mut encoder = encoding.new_encoder();
    let mut buf = [0u8; 16 * 1024];
    for chunk in text.chunks() {
      let mut remaining = chunk;
      loop {
        let (result, read, written, _) = encoder.encode_from_utf8(remaining, &mut buf, false);
        file
          .write_all(&buf[..written])
          .map_err(|source| write_err(path, source))?;
        remaining = &remaining[read..];
        if matches!(result, encoding_rs::CoderResult::InputEmpty) {
          break;
        }
      }
    }
    let (_, _, written, _) = encoder.encode_from_utf8("", &mut buf, true);
    file
      .write_all(&buf[..written])
      .map_err(|source| write_err(path, source))?;
  }

  file.flush().map_err(|source| write_err(path, source))?;
  Ok(())
}

fn write_err(path: &Path, source: std::io::Error) -> IoError {
  IoError::Write {
    path: path.display().to_string(),
    source,
  }
}

/// A NUL byte in the leading sample marks the file as binary. Text
/// encodings in the wild don't produce NULs outside UTF-16/32, which the
/// encoding detector identifies by BOM before this check matters.
fn is_binary(bytes: &[u8]) -> bool {
  if has_utf16_or_utf32_bom(bytes) {
    return false;
  }
  let sample = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
  sample.contains(&0)
}

fn has_utf16_or_utf32_bom(bytes: &[u8]) -> bool {
  bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF])
}

fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
  if let Some((encoding, _)) = Encoding::for_bom(bytes) {
    return encoding;
  }
  let mut detector = EncodingDetector::new();
  detector.feed(bytes, true);
  detector.guess(None, true)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
  }

  #[test]
  fn loads_utf8_text() {
    let file = write_temp("hello 世界\nsecond line\n".as_bytes());
    let loaded = load(file.path()).unwrap();

    assert_eq!(loaded.text, "hello 世界\nsecond line\n");
    assert_eq!(loaded.encoding, UTF_8);
    assert_eq!(loaded.line_ending, LineEnding::LF);
    assert_eq!(loaded.size_bytes, "hello 世界\nsecond line\n".len() as u64);
  }

  #[test]
  fn detects_crlf() {
    let file = write_temp(b"one\r\ntwo\r\n");
    let loaded = load(file.path()).unwrap();
    assert_eq!(loaded.line_ending, LineEnding::Crlf);
  }

  #[test]
  fn rejects_binary() {
    let file = write_temp(&[0x7F, b'E', b'L', b'F', 0x00, 0x01, 0x02]);
    let err = load(file.path()).unwrap_err();
    assert!(matches!(err, IoError::Binary { .. }));
  }

  #[test]
  fn decodes_latin1() {
    // "café" in ISO-8859-1.
    let file = write_temp(&[b'c', b'a', b'f', 0xE9, b'\n']);
    let loaded = load(file.path()).unwrap();
    assert_eq!(loaded.text, "café\n");
    assert_ne!(loaded.encoding, UTF_8);
  }

  #[test]
  fn save_roundtrips_utf8() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let text = Rope::from("line one\nline 二\n");
    save(file.path(), &text, UTF_8).unwrap();

    let loaded = load(file.path()).unwrap();
    assert_eq!(loaded.text, text);
  }

  #[test]
  fn save_reencodes_to_original_encoding() {
    let file = write_temp(&[b'c', b'a', b'f', 0xE9]);
    let loaded = load(file.path()).unwrap();

    let out = tempfile::NamedTempFile::new().unwrap();
    save(out.path(), &loaded.text, loaded.encoding).unwrap();
    let bytes = fs::read(out.path()).unwrap();
    assert_eq!(bytes, [b'c', b'a', b'f', 0xE9]);
  }

  #[test]
  fn missing_file_is_a_read_error() {
    let err = load(Path::new("/nonexistent/definitely/missing.txt")).unwrap_err();
    assert!(matches!(err, IoError::Read { .. }));
  }
}
