use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// Source of tile bytes that supports positioned reads.
/// Positioned reads do not share a cursor, so a single reader can serve concurrent tile decodes.
pub trait ChunkReader {
    /// Fills `buf` with the bytes starting at `offset`, fails if the source ends before `buf` is filled.
    fn read_chunk(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;
}

impl ChunkReader for File {
    #[cfg(unix)]
    fn read_chunk(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_chunk(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;

        let mut total_bytes_read = 0;
        while total_bytes_read < buf.len() {
            let bytes_read = self.seek_read(&mut buf[total_bytes_read..], offset + total_bytes_read as u64)?;
            if bytes_read == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("Read of {} bytes at offset {offset} ended early", buf.len()),
                ));
            }

            total_bytes_read += bytes_read;
        }

        Ok(())
    }
}

impl ChunkReader for [u8] {
    fn read_chunk(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        match self.get(start..start.saturating_add(buf.len())) {
            Some(chunk) if chunk.len() == buf.len() => {
                buf.copy_from_slice(chunk);
                Ok(())
            }
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("Read of {} bytes at offset {offset} outside of the {} byte buffer", buf.len(), self.len()),
            )),
        }
    }
}

impl ChunkReader for Vec<u8> {
    fn read_chunk(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.as_slice().read_chunk(offset, buf)
    }
}

/// Returns the path with only its final segment upper-cased, directory components are left untouched.
pub fn upper_case_file_name(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?.to_str()?;
    Some(path.with_file_name(file_name.to_uppercase()))
}

/// Opens `path`, retrying once with an upper-cased file name.
/// Grids copied from case insensitive file systems often carry `HDR.ADF` style names.
/// Returns the opened file together with the path that was found.
pub fn open_case_insensitive(path: &Path) -> Result<(File, PathBuf)> {
    match File::open(path) {
        Ok(file) => Ok((file, path.to_path_buf())),
        Err(err) => {
            let fallback = upper_case_file_name(path).filter(|upper| upper != path);
            if let Some(upper) = fallback {
                log::debug!("Failed to open {} ({err}), trying {}", path.display(), upper.display());
                if let Ok(file) = File::open(&upper) {
                    return Ok((file, upper));
                }
            }

            Err(Error::FileNotFound(path.to_path_buf()))
        }
    }
}

/// Reads the complete file contents using the case-insensitive lookup.
pub fn read_case_insensitive(path: &Path) -> Result<Vec<u8>> {
    use std::io::Read;

    let (mut file, _) = open_case_insensitive(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}
