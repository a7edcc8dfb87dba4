use crate::storage::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Whole-page I/O against a single backing file.
///
/// Page `n` occupies bytes `[n * page_size, (n + 1) * page_size)`; the file
/// carries no header and only ever grows by whole pages.
#[derive(Debug)]
pub struct PageManager {
    file: File,
    page_size: usize,
}

impl PageManager {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    /// Opens an existing file, creating an empty one if it is missing.
    pub fn open(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    pub fn read_page(&mut self, page_number: u32, buf: &mut [u8]) -> StorageResult<()> {
        self.check_len(buf.len())?;

        let offset = self.page_offset(page_number);
        if offset + self.page_size as u64 > self.file.metadata()?.len() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("page {} is beyond the end of the file", page_number),
            )));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_page(&mut self, page_number: u32, data: &[u8]) -> StorageResult<()> {
        self.check_len(data.len())?;

        let offset = self.page_offset(page_number);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Writes `data` as a new page at the end of the file and returns its number.
    pub fn append_page(&mut self, data: &[u8]) -> StorageResult<u32> {
        let page_number = self.num_pages()?;
        self.write_page(page_number, data)?;
        Ok(page_number)
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / self.page_size as u64) as u32)
    }

    fn check_len(&self, len: usize) -> StorageResult<()> {
        if len != self.page_size {
            return Err(StorageError::Corrupted(format!(
                "buffer size must be the page size ({}), got {}",
                self.page_size, len
            )));
        }
        Ok(())
    }

    fn page_offset(&self, page_number: u32) -> u64 {
        page_number as u64 * self.page_size as u64
    }
}
