use std::io::{self, Read, Seek};

use serde::Serialize;

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ArchiveFormat {
    Zip,
    Tar(TarCompress),
}

/// Compression codec wrapped around a tar stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TarCompress {
    None,
    Gzip,
    Xz,
    Zstd,
}

#[cfg(feature = "tar")]
impl TarCompress {
    /// Wrap `reader` in the decoder for this codec.
    pub fn decoder<R: Read>(self, reader: R) -> Result<Decoder<R>, Error> {
        match self {
            Self::None => Ok(Decoder::Passthrough(reader)),
            Self::Gzip => Ok(Decoder::Gzip(Box::new(flate2::read::GzDecoder::new(
                reader,
            )))),
            #[cfg(feature = "xz")]
            Self::Xz => Ok(Decoder::Xz(Box::new(xz2::read::XzDecoder::new(reader)))),
            #[cfg(not(feature = "xz"))]
            Self::Xz => Err(Error::UnsupportedFormat),
            #[cfg(feature = "zstd")]
            Self::Zstd => {
                let decoder =
                    zstd::stream::read::Decoder::new(reader).map_err(|e| Error::InvalidArchive {
                        reason: format!("zstd frame: {e}"),
                    })?;
                Ok(Decoder::Zstd(Box::new(decoder)))
            }
            #[cfg(not(feature = "zstd"))]
            Self::Zstd => Err(Error::UnsupportedFormat),
        }
    }
}

/// Decompressing reader for tar payloads.
#[cfg(feature = "tar")]
pub enum Decoder<R: Read> {
    Passthrough(R),
    Gzip(Box<flate2::read::GzDecoder<R>>),
    #[cfg(feature = "xz")]
    Xz(Box<xz2::read::XzDecoder<R>>),
    #[cfg(feature = "zstd")]
    Zstd(Box<zstd::stream::read::Decoder<'static, io::BufReader<R>>>),
}

#[cfg(feature = "tar")]
impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Passthrough(r) => r.read(buf),
            Self::Gzip(d) => d.read(buf),
            #[cfg(feature = "xz")]
            Self::Xz(d) => d.read(buf),
            #[cfg(feature = "zstd")]
            Self::Zstd(d) => d.read(buf),
        }
    }
}

/// Identify an archive from its leading bytes.
pub fn detect_format(data: &[u8]) -> Option<ArchiveFormat> {
    match data {
        [0x50, 0x4B, 0x03, 0x04, ..] | [0x50, 0x4B, 0x05, 0x06, ..] => Some(ArchiveFormat::Zip),
        [0x1F, 0x8B, ..] => Some(ArchiveFormat::Tar(TarCompress::Gzip)),
        [0x28, 0xB5, 0x2F, 0xFD, ..] => Some(ArchiveFormat::Tar(TarCompress::Zstd)),
        [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, ..] => Some(ArchiveFormat::Tar(TarCompress::Xz)),
        _ if is_tar_header(data) => Some(ArchiveFormat::Tar(TarCompress::None)),
        _ => None,
    }
}

fn is_tar_header(data: &[u8]) -> bool {
    data.len() >= 263 && (data[257..263] == *b"ustar\0" || data[257..263] == *b"ustar ")
}

/// Sniff the format and rewind the reader to where it started.
pub fn detect_from_reader<R: Read + Seek>(reader: &mut R) -> io::Result<Option<ArchiveFormat>> {
    let start = reader.stream_position()?;
    let mut header = [0u8; 512];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.seek(io::SeekFrom::Start(start))?;
    Ok(detect_format(&header[..filled]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detect_zip_format() {
        let zip_header = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x00, 0x00];
        assert_eq!(detect_format(&zip_header), Some(ArchiveFormat::Zip));
    }

    #[test]
    fn detect_empty_zip() {
        let eocd = [0x50, 0x4B, 0x05, 0x06, 0x00, 0x00];
        assert_eq!(detect_format(&eocd), Some(ArchiveFormat::Zip));
    }

    #[test]
    fn detect_compressed_tars() {
        assert_eq!(
            detect_format(&[0x1F, 0x8B, 0x08, 0x00]),
            Some(ArchiveFormat::Tar(TarCompress::Gzip))
        );
        assert_eq!(
            detect_format(&[0x28, 0xB5, 0x2F, 0xFD, 0x00]),
            Some(ArchiveFormat::Tar(TarCompress::Zstd))
        );
        assert_eq!(
            detect_format(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00]),
            Some(ArchiveFormat::Tar(TarCompress::Xz))
        );
    }

    #[test]
    fn detect_plain_tar() {
        let mut tar_header = [0u8; 512];
        tar_header[257..263].copy_from_slice(b"ustar\0");
        assert_eq!(
            detect_format(&tar_header),
            Some(ArchiveFormat::Tar(TarCompress::None))
        );
    }

    #[test]
    fn unknown_and_truncated_input() {
        assert_eq!(detect_format(&[0xDE, 0xAD, 0xBE, 0xEF]), None);
        assert_eq!(detect_format(&[0u8; 256]), None);
        assert_eq!(detect_format(&[]), None);
    }

    #[test]
    fn reader_is_rewound_after_detection() {
        let mut data = vec![0x1F, 0x8B, 0x08, 0x00];
        data.extend_from_slice(&[0u8; 16]);
        let mut cursor = Cursor::new(data);
        let format = detect_from_reader(&mut cursor).unwrap();
        assert_eq!(format, Some(ArchiveFormat::Tar(TarCompress::Gzip)));
        assert_eq!(cursor.position(), 0);
    }

    #[cfg(feature = "tar")]
    #[test]
    fn passthrough_decoder_reads_input() {
        let mut decoder = TarCompress::None.decoder(Cursor::new(b"hello".to_vec())).unwrap();
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(all(feature = "tar", not(feature = "xz")))]
    #[test]
    fn xz_without_feature_is_unsupported() {
        let result = TarCompress::Xz.decoder(Cursor::new(Vec::new()));
        assert!(matches!(result, Err(Error::UnsupportedFormat)));
    }
}
