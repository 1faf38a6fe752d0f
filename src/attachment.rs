use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{Error, Result};
use crate::mime::DecodedItem;

/// Writes `data` to `dir/filename`, replacing any existing file of that name.
///
/// Only the final component of `filename` is used, so a name like
/// `../../etc/passwd` lands in `dir` as `passwd`.
pub fn save_attachment(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| Error::Io {
            path: filename.to_owned(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a usable file name"),
        })?;

    let path = dir.join(name);
    info!("Saving attachment {} ({} bytes)", path.display(), data.len());
    fs::write(&path, data).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

/// Saves every attachment among `items`, in order.
pub fn save_attachments(dir: &Path, items: &[DecodedItem]) -> Result<Vec<PathBuf>> {
    items
        .iter()
        .filter_map(|item| match *item {
            DecodedItem::Attachment {
                ref filename,
                ref data,
            } => Some(save_attachment(dir, filename, data)),
            DecodedItem::Text(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_attachments__writes_raw_bytes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.txt"), b"old contents").unwrap();

        let items = vec![
            DecodedItem::Text("ignored".to_owned()),
            DecodedItem::Attachment {
                filename: "test.txt".to_owned(),
                data: b"hello".to_vec(),
            },
            DecodedItem::Attachment {
                filename: "blob.bin".to_owned(),
                data: vec![0, 159, 255],
            },
        ];
        let saved = save_attachments(dir.path(), &items).unwrap();

        assert_eq!(
            vec![dir.path().join("test.txt"), dir.path().join("blob.bin")],
            saved
        );
        assert_eq!(b"hello".to_vec(), fs::read(dir.path().join("test.txt")).unwrap());
        assert_eq!(vec![0, 159, 255], fs::read(dir.path().join("blob.bin")).unwrap());
    }

    #[test]
    fn save_attachment__strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_attachment(dir.path(), "../../evil.sh", b"#!/bin/sh").unwrap();
        assert_eq!(dir.path().join("evil.sh"), path);
        assert!(path.is_file());
    }

    #[test]
    fn save_attachment__rejects_names_without_a_file_component() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            save_attachment(dir.path(), "..", b"x"),
            Err(Error::Io { .. })
        ));
        assert!(matches!(
            save_attachment(dir.path(), "", b"x"),
            Err(Error::Io { .. })
        ));
    }
}
