use std::io::{self, Read as _, Write as _};
use std::{fmt, str};

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 6;
const BROTLI_LG_WINDOW_SIZE: u32 = 20;

/// Compression applied to the plaintext before encryption
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Gzip,
    Brotli,
}

impl Compression {
    pub fn compress(self, input: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Compression::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(input)?;
                encoder.finish()
            }
            Compression::Brotli => {
                let mut bytes = vec![];
                {
                    let mut writer = brotli::CompressorWriter::new(
                        &mut bytes,
                        BROTLI_BUFFER_SIZE,
                        BROTLI_QUALITY,
                        BROTLI_LG_WINDOW_SIZE,
                    );
                    writer.write_all(input)?;
                    writer.flush()?;
                }
                Ok(bytes)
            }
        }
    }

    /// Inflate `input` with a streaming decoder
    pub fn decompress(self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut bytes = vec![];
        match self {
            Compression::Gzip => {
                flate2::read::GzDecoder::new(input).read_to_end(&mut bytes)?;
            }
            Compression::Brotli => {
                brotli::Decompressor::new(input, BROTLI_BUFFER_SIZE).read_to_end(&mut bytes)?;
            }
        }
        Ok(bytes)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compression::Gzip => "gzip",
            Compression::Brotli => "brotli",
        })
    }
}

#[derive(Debug)]
pub struct UnknownCompression(String);

impl fmt::Display for UnknownCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown compression: {}", self.0)
    }
}

impl std::error::Error for UnknownCompression {}

impl str::FromStr for Compression {
    type Err = UnknownCompression;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gzip" | "gz" => Ok(Compression::Gzip),
            "brotli" | "br" => Ok(Compression::Brotli),
            other => Err(UnknownCompression(other.to_owned())),
        }
    }
}
