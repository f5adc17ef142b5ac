// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turning a location string into a byte stream.
//!
//! The crate reads local files itself. Anything with a URI scheme other
//! than `file:` is handed to a caller-supplied [`SourceOpener`], so the
//! decoder never depends on a networking stack.

use log::debug;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// A readable byte source produced by an opener.
pub type BoxedSource = std::boxed::Box<dyn Read + Send>;

/// Where a location string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location<'a> {
    /// A local file, given as a path or a `file:` URI.
    File(PathBuf),
    /// A URI with some other scheme, kept verbatim.
    Remote(&'a str),
}

impl<'a> Location<'a> {
    /// Classify a location string.
    ///
    /// `file:///tmp/a.gif`, `file:/tmp/a.gif` and `/tmp/a.gif` all name
    /// the same file. A scheme is only recognised when followed by `://`,
    /// so Windows drive letters stay paths.
    pub fn parse(location: &'a str) -> Self {
        let trimmed = location.trim();
        if let Some(rest) = strip_prefix_ignore_case(trimmed, "file:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            return Self::File(PathBuf::from(path));
        }
        match trimmed.find("://") {
            Some(at) if at > 0 && trimmed[..at].chars().all(is_scheme_char) => Self::Remote(trimmed),
            _ => Self::File(PathBuf::from(trimmed)),
        }
    }
}

fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Opens byte streams for locations.
///
/// Implement this to serve remote URIs (or in-memory test data). The
/// returned stream is read forward-only and dropped as soon as decoding
/// ends.
pub trait SourceOpener {
    fn open(&self, location: &str) -> io::Result<BoxedSource>;
}

/// Opens local paths and `file:` URIs; refuses everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOpener;

impl FileOpener {
    fn open_path(path: &Path) -> io::Result<BoxedSource> {
        if path.as_os_str().is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "empty location"));
        }
        let file = File::open(path)?;
        debug!("opened {}", path.display());
        Ok(std::boxed::Box::new(BufReader::new(file)))
    }
}

impl SourceOpener for FileOpener {
    fn open(&self, location: &str) -> io::Result<BoxedSource> {
        match Location::parse(location) {
            Location::File(path) => Self::open_path(&path),
            Location::Remote(uri) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no opener for remote location {uri}"),
            )),
        }
    }
}

#[test]
fn classify_locations() {
    assert_eq!(Location::parse("/tmp/a.gif"), Location::File("/tmp/a.gif".into()));
    assert_eq!(Location::parse(" anim.gif "), Location::File("anim.gif".into()));
    assert_eq!(Location::parse("file:///tmp/a.gif"), Location::File("/tmp/a.gif".into()));
    assert_eq!(Location::parse("FILE:/tmp/a.gif"), Location::File("/tmp/a.gif".into()));
    assert_eq!(Location::parse("C:\\images\\a.gif"), Location::File("C:\\images\\a.gif".into()));
    assert_eq!(
        Location::parse("https://example.com/a.gif"),
        Location::Remote("https://example.com/a.gif")
    );
    assert_eq!(Location::parse("dir/x://y"), Location::File("dir/x://y".into()));
}

#[test]
fn file_opener_errors() {
    let err = FileOpener.open("https://example.com/a.gif").err().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    let err = FileOpener.open("").err().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    let err = FileOpener.open("/definitely/not/here.gif").err().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}
