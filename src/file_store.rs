use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::{fs, io};

/// Size of each read while looking for the end of a header.
const HEADER_CHUNK: usize = 256;

/// Access to the directory of post files and the per-post asset directories.
///
/// Names are plain file names relative to the content directory; asset calls
/// take the post id and a file name inside `<content>/<id>/`.
pub trait FileStore: Send + Sync {
    /// File names (not directories) in the content directory with the post extension.
    fn list(&self) -> io::Result<Vec<String>>;
    fn exists(&self, name: &str) -> bool;
    fn read(&self, name: &str) -> io::Result<String>;
    /// Reads only up to the first blank line.
    fn read_header(&self, name: &str) -> io::Result<String>;
    fn write(&self, name: &str, data: &str) -> io::Result<()>;
    fn delete(&self, name: &str) -> io::Result<()>;

    fn asset_path(&self, id: &str, name: &str) -> PathBuf;
    fn read_asset(&self, id: &str, name: &str) -> io::Result<String>;
    fn write_asset(&self, id: &str, name: &str, data: &str) -> io::Result<()>;
    /// Deletes `<content>/<id>/` and everything in it. A missing directory is fine.
    fn remove_assets(&self, id: &str) -> io::Result<()>;
}

pub struct DirStore {
    pub root_dir: PathBuf,
    pub extension: String,
}

impl DirStore {
    pub fn new(root_dir: &Path, extension: &str) -> Self {
        DirStore {
            root_dir: root_dir.to_path_buf(),
            extension: extension.to_string(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root_dir.join(name)
    }
}

impl FileStore for DirStore {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut posts = vec![];
        let entries = fs::read_dir(self.root_dir.as_path())?;
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            if let Some(file_name) = entry.file_name().to_str() {
                if file_name.ends_with(self.extension.as_str()) {
                    posts.push(file_name.to_string());
                }
            }
        }
        Ok(posts)
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn read(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.path(name))
    }

    fn read_header(&self, name: &str) -> io::Result<String> {
        read_until_blank_line(&mut File::open(self.path(name))?)
    }

    fn write(&self, name: &str, data: &str) -> io::Result<()> {
        fs::write(self.path(name), data)
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path(name))
    }

    fn asset_path(&self, id: &str, name: &str) -> PathBuf {
        self.root_dir.join(id).join(name)
    }

    fn read_asset(&self, id: &str, name: &str) -> io::Result<String> {
        fs::read_to_string(self.asset_path(id, name))
    }

    fn write_asset(&self, id: &str, name: &str, data: &str) -> io::Result<()> {
        fs::create_dir_all(self.root_dir.join(id))?;
        fs::write(self.asset_path(id, name), data)
    }

    fn remove_assets(&self, id: &str) -> io::Result<()> {
        match fs::remove_dir_all(self.root_dir.join(id)) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            res => res,
        }
    }
}

/// Reads in small chunks and stops as soon as two line feeds in a row are
/// seen (carriage returns are ignored). The blank line itself is not included.
pub fn read_until_blank_line<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut buf = [0u8; HEADER_CHUNK];
    let mut header = Vec::with_capacity(HEADER_CHUNK);
    let mut line_feeds = 0;

    'read: loop {
        let bytes = reader.read(&mut buf)?;
        if bytes == 0 {
            break;
        }
        for &b in &buf[..bytes] {
            match b {
                b'\r' => continue,
                b'\n' => {
                    line_feeds += 1;
                    if line_feeds == 2 {
                        break 'read;
                    }
                }
                _ => line_feeds = 0,
            }
            header.push(b);
        }
    }

    String::from_utf8(header).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}
