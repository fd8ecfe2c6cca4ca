use image::DynamicImage;
use std::io::Cursor;
use thiserror::Error;
use tracing::warn;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// The key Civitai looks for when scanning an upload for generation settings.
pub const PARAMETERS_KEY: &str = "parameters";

const METADATA_DISPLAY_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not encode png: {0}")]
    Encode(#[from] png::EncodingError),
}

/// A decoded upload: pixels plus the ordered text metadata found in the
/// container. Built per request and dropped with the response; nothing is
/// ever kept server-side.
#[derive(Debug)]
pub struct ImageAsset {
    image: DynamicImage,
    texts: Vec<(String, String)>,
}

impl ImageAsset {
    /// Decode PNG/JPEG/WEBP bytes. Text metadata is only a PNG concept here;
    /// for other formats the mapping starts empty. An unreadable text chunk
    /// costs the metadata listing, never the image.
    pub fn decode(bytes: &[u8]) -> Result<Self, AssetError> {
        let image = image::load_from_memory(bytes)?;
        let texts = if bytes.starts_with(&PNG_SIGNATURE) {
            read_text_chunks(bytes).unwrap_or_else(|err| {
                warn!("failed to read png text chunks: {err}");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        Ok(Self { image, texts })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Human-readable dump of all text metadata, one `key: value` entry per
    /// blank-line-separated block, long values truncated for display.
    pub fn metadata_dump(&self) -> String {
        self.texts
            .iter()
            .map(|(key, value)| {
                let display: String = if value.chars().count() > METADATA_DISPLAY_LIMIT {
                    let truncated: String = value.chars().take(METADATA_DISPLAY_LIMIT).collect();
                    format!("{truncated}...")
                } else {
                    value.clone()
                };
                format!("{key}: {display}")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Re-encode as PNG with `parameters` set to the given text and every
    /// other pre-existing text entry carried forward verbatim. Pixels are
    /// normalized to RGBA8 when the source has an alpha channel, RGB8
    /// otherwise. The asset itself is left untouched.
    pub fn write_png(&self, parameters: &str) -> Result<Vec<u8>, AssetError> {
        let (color, data) = if self.image.color().has_alpha() {
            (png::ColorType::Rgba, self.image.to_rgba8().into_raw())
        } else {
            (png::ColorType::Rgb, self.image.to_rgb8().into_raw())
        };

        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, self.width(), self.height());
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);

        add_text_chunk(&mut encoder, PARAMETERS_KEY, parameters)?;
        for (key, value) in &self.texts {
            if key != PARAMETERS_KEY {
                add_text_chunk(&mut encoder, key, value)?;
            }
        }

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&data)?;
        writer.finish()?;
        Ok(out)
    }
}

/// tEXt when the value fits in Latin-1, iTXt otherwise — the same choice
/// image-generation tools make when stamping `parameters` into a PNG.
fn add_text_chunk<W: std::io::Write>(
    encoder: &mut png::Encoder<W>,
    key: &str,
    value: &str,
) -> Result<(), png::EncodingError> {
    let latin1 = value.chars().all(|c| (c as u32) < 256);
    if latin1 {
        encoder.add_text_chunk(key.to_string(), value.to_string())
    } else {
        encoder.add_itxt_chunk(key.to_string(), value.to_string())
    }
}

/// Collect tEXt, zTXt, and iTXt entries in chunk order. `finish` runs the
/// reader to IEND so chunks stored after the image data are seen too.
fn read_text_chunks(bytes: &[u8]) -> Result<Vec<(String, String)>, png::DecodingError> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let mut reader = decoder.read_info()?;
    reader.finish()?;

    let info = reader.info();
    let mut texts = Vec::new();
    for chunk in &info.uncompressed_latin1_text {
        texts.push((chunk.keyword.clone(), chunk.text.clone()));
    }
    for chunk in &info.compressed_latin1_text {
        match chunk.get_text() {
            Ok(text) => texts.push((chunk.keyword.clone(), text)),
            Err(err) => warn!(keyword = %chunk.keyword, "skipping unreadable zTXt chunk: {err}"),
        }
    }
    for chunk in &info.utf8_text {
        match chunk.get_text() {
            Ok(text) => texts.push((chunk.keyword.clone(), text)),
            Err(err) => warn!(keyword = %chunk.keyword, "skipping unreadable iTXt chunk: {err}"),
        }
    }
    Ok(texts)
}
