use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

const BLOCK_SIZE: usize = 64 * 1024;

/// Stream a file through SHA-256 in fixed-size blocks and return the hex
/// digest. The checksum is the primary key for image identity, so this must
/// stay a pure function of the file bytes.
pub fn sha256_checksum(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BLOCK_SIZE];
    loop {
        let count = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file: {:?}", path))?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_known_checksum() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hello.txt");
        let mut f = File::create(&path)?;
        f.write_all(b"hello world")?;
        let checksum = sha256_checksum(&path)?;
        assert_eq!(
            checksum,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        Ok(())
    }

    #[test]
    fn test_identical_bytes_identical_checksum() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a.bin");
        let b = dir.path().join("renamed.bin");
        std::fs::write(&a, [7u8; 200_000])?;
        std::fs::write(&b, [7u8; 200_000])?;
        assert_eq!(sha256_checksum(&a)?, sha256_checksum(&b)?);
        Ok(())
    }

    #[test]
    fn test_missing_file_errors() {
        let res = sha256_checksum(Path::new("/nonexistent/nope.jpg"));
        assert!(res.is_err());
    }
}
