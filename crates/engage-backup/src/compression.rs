//! Compression and checksum utilities for backup archives.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Default compression level (6 = balanced speed/ratio).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Calculates the SHA256 checksum of a file.
pub fn calculate_checksum(path: &Path) -> anyhow::Result<String> {
    let mut file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open file for checksum: {}", e))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| anyhow::anyhow!("Failed to calculate checksum: {}", e))?;

    let hash = hasher.finalize();
    Ok(format!("{:x}", hash))
}

/// True if the file starts with the gzip magic bytes.
pub fn is_gzip_file(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Archive file extension for the given compression setting.
pub fn archive_extension(compress: bool) -> &'static str {
    if compress {
        "tgz"
    } else {
        "tar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_checksum_calculation() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("test.txt");
        std::fs::write(&test_file, "test content").unwrap();

        let checksum = calculate_checksum(&test_file).unwrap();

        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, calculate_checksum(&test_file).unwrap());
    }

    #[test]
    fn test_gzip_detection() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("plain.tar");
        let gz = temp_dir.path().join("archive.tgz");
        let empty = temp_dir.path().join("empty");

        std::fs::write(&plain, "not compressed").unwrap();
        std::fs::write(&empty, "").unwrap();
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b"data").unwrap();
        encoder.finish().unwrap();

        assert!(!is_gzip_file(&plain).unwrap());
        assert!(!is_gzip_file(&empty).unwrap());
        assert!(is_gzip_file(&gz).unwrap());
    }
}
