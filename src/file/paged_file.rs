use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};

/// Block-level access to one file made of fixed-size pages
pub struct PagedFile {
    file: File,
    path: PathBuf,
    page_size: usize,
}

impl PagedFile {
    /// Create a new, empty paged file
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> FileResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::open(path, page_size)
    }

    /// Open a paged file for reading and writing, creating it if missing
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> FileResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            page_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages, counting a trailing partial page as a whole one
    pub fn num_pages(&self) -> FileResult<usize> {
        let file_size = self.file.metadata()?.len();
        Ok(file_size.div_ceil(self.page_size as u64) as usize)
    }

    /// Read exactly one page into `buffer`
    pub fn read_page(&mut self, page_no: usize, buffer: &mut [u8]) -> FileResult<()> {
        self.check_buffer(buffer.len())?;

        let num_pages = self.num_pages()?;
        if page_no >= num_pages {
            return Err(FileError::PageOutOfRange { page_no, num_pages });
        }

        self.file
            .seek(SeekFrom::Start((page_no * self.page_size) as u64))?;

        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.file.read(&mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        // A short trailing page reads as zero-padded
        buffer[filled..].fill(0);
        Ok(())
    }

    /// Overwrite an existing page
    pub fn write_page(&mut self, page_no: usize, buffer: &[u8]) -> FileResult<()> {
        self.check_buffer(buffer.len())?;

        let num_pages = self.num_pages()?;
        if page_no >= num_pages {
            return Err(FileError::PageOutOfRange { page_no, num_pages });
        }

        self.file
            .seek(SeekFrom::Start((page_no * self.page_size) as u64))?;
        self.file.write_all(buffer)?;
        Ok(())
    }

    /// Append one page at the end of the file and return its number
    pub fn append_page(&mut self, buffer: &[u8]) -> FileResult<usize> {
        self.check_buffer(buffer.len())?;

        let page_no = self.num_pages()?;
        let offset = (page_no * self.page_size) as u64;

        // Round a partial trailing page up before appending
        self.file.set_len(offset)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)?;
        Ok(page_no)
    }

    /// Sync file contents to disk
    pub fn sync(&mut self) -> FileResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn check_buffer(&self, actual: usize) -> FileResult<()> {
        if actual != self.page_size {
            return Err(FileError::InvalidPageSize {
                expected: self.page_size,
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PAGE_SIZE;
    use tempfile::TempDir;

    fn setup_test_file() -> (TempDir, PagedFile) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = PagedFile::create(temp_dir.path().join("test.dat"), PAGE_SIZE).unwrap();
        (temp_dir, file)
    }

    #[test]
    fn test_create_file_already_exists() {
        let (temp_dir, _file) = setup_test_file();
        let result = PagedFile::create(temp_dir.path().join("test.dat"), PAGE_SIZE);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_append_and_read_page() {
        let (_temp_dir, mut file) = setup_test_file();

        let mut write_buffer = vec![0u8; PAGE_SIZE];
        write_buffer[0] = 42;
        write_buffer[PAGE_SIZE - 1] = 255;

        assert_eq!(file.append_page(&write_buffer).unwrap(), 0);
        assert_eq!(file.num_pages().unwrap(), 1);

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        file.read_page(0, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, write_buffer);
    }

    #[test]
    fn test_write_page_in_place() {
        let (_temp_dir, mut file) = setup_test_file();
        for page_no in 0..3 {
            file.append_page(&vec![page_no as u8; PAGE_SIZE]).unwrap();
        }

        file.write_page(1, &vec![9u8; PAGE_SIZE]).unwrap();
        assert_eq!(file.num_pages().unwrap(), 3);

        let mut buffer = vec![0u8; PAGE_SIZE];
        file.read_page(1, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 9));
        file.read_page(2, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 2));
    }

    #[test]
    fn test_read_out_of_range() {
        let (_temp_dir, mut file) = setup_test_file();
        let mut buffer = vec![0u8; PAGE_SIZE];

        let result = file.read_page(0, &mut buffer);
        assert!(matches!(
            result,
            Err(FileError::PageOutOfRange {
                page_no: 0,
                num_pages: 0
            })
        ));

        let result = file.write_page(3, &buffer);
        assert!(matches!(result, Err(FileError::PageOutOfRange { .. })));
    }

    #[test]
    fn test_partial_trailing_page() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("partial.dat");
        std::fs::write(&path, [7u8; 10]).unwrap();

        let mut file = PagedFile::open(&path, 8).unwrap();
        assert_eq!(file.num_pages().unwrap(), 2);

        let mut buffer = vec![0u8; 8];
        file.read_page(1, &mut buffer).unwrap();
        assert_eq!(buffer, vec![7, 7, 0, 0, 0, 0, 0, 0]);

        // Appending rounds the file up to whole pages first
        assert_eq!(file.append_page(&[1u8; 8]).unwrap(), 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 24);
    }

    #[test]
    fn test_invalid_buffer_size() {
        let (_temp_dir, mut file) = setup_test_file();

        let mut small_buffer = vec![0u8; PAGE_SIZE - 1];
        let result = file.read_page(0, &mut small_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));

        let large_buffer = vec![0u8; PAGE_SIZE + 1];
        let result = file.append_page(&large_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));
    }
}
