//! Opt-in JPEG recompression of image XObjects.
//!
//! Not part of the default compression path: quality tiers only change page
//! geometry and serialization unless the caller asks for this explicitly.

use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream};

use crate::document::resolve;

/// Decoded pixels plus the pieces of the stream dictionary we need.
struct SourceImage {
    width: u32,
    height: u32,
    components: u8,
    content: Vec<u8>,
}

/// Recompresses every image XObject in `doc`. Returns how many were rewritten.
///
/// Images that fail to decode are logged and left untouched.
pub fn recompress_images(doc: &mut Document, quality: u8, max_dim: u32) -> usize {
    let object_ids: Vec<ObjectId> = doc.objects.keys().cloned().collect();
    // Masks are rewritten together with their image, whatever their id order.
    let mut handled = mask_ids(doc);
    let mut rewritten = 0;

    for object_id in object_ids {
        if handled.contains(&object_id) {
            continue;
        }
        let Some(smask_id) = image_smask(doc, object_id) else {
            continue;
        };
        handled.insert(object_id);

        match recompress_image(doc, object_id, smask_id, quality, max_dim) {
            Ok(actions) => {
                log::debug!("Image {}: {}", object_id.0, actions);
                rewritten += 1;
            }
            Err(e) => log::warn!("Failed to process image {}: {:#}", object_id.0, e),
        }
    }

    rewritten
}

/// `Some(mask)` if `object_id` is an image XObject, `None` otherwise.
fn image_smask(doc: &Document, object_id: ObjectId) -> Option<Option<ObjectId>> {
    let Some(Object::Stream(stream)) = doc.objects.get(&object_id) else {
        return None;
    };
    let is_image = stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Image")
        .unwrap_or(false);
    if !is_image {
        return None;
    }
    Some(stream.dict.get(b"SMask").and_then(Object::as_reference).ok())
}

/// Every object referenced as `SMask` or `Mask` by an image XObject.
fn mask_ids(doc: &Document) -> HashSet<ObjectId> {
    doc.objects
        .keys()
        .filter(|id| image_smask(doc, **id).is_some())
        .filter_map(|id| doc.objects.get(id).and_then(|o| o.as_stream().ok()))
        .flat_map(|stream| {
            [b"SMask".as_slice(), b"Mask".as_slice()]
                .into_iter()
                .filter_map(move |key| stream.dict.get(key).and_then(Object::as_reference).ok())
        })
        .collect()
}

fn recompress_image(
    doc: &mut Document,
    object_id: ObjectId,
    smask_id: Option<ObjectId>,
    quality: u8,
    max_dim: u32,
) -> Result<String> {
    let mut actions = Vec::new();

    inline_indirect_entry(doc, object_id, b"Filter");
    inline_indirect_entry(doc, object_id, b"DecodeParms");

    let source = read_image(doc, object_id, &mut actions)?;
    let mut img = decode_pixels(&source, &mut actions)?;

    if let Some(mask_id) = smask_id {
        if apply_smask(doc, mask_id, &mut img)? {
            actions.push("applied SMask".to_string());
        }
    }

    let img = if img.width() > max_dim || img.height() > max_dim {
        let resized = img.resize(max_dim, max_dim, FilterType::Lanczos3);
        actions.push(format!(
            "resize {}x{} -> {}x{}",
            img.width(),
            img.height(),
            resized.width(),
            resized.height()
        ));
        resized
    } else {
        img
    };

    match smask_id {
        Some(mask_id) if img.color().has_alpha() => {
            write_rgb_with_alpha(doc, object_id, mask_id, &img, quality)?;
            actions.push("re-encode: JPEG + Flate alpha".to_string());
        }
        _ => {
            let jpeg = encode_jpeg(&img, quality)?;
            let (w, h) = img.dimensions();
            replace_with_jpeg(doc, object_id, jpeg, w, h)?;
            actions.push(format!("re-encode: JPEG(q={})", quality));
        }
    }

    Ok(actions.join(", "))
}

/// Replaces a referenced `Filter`/`DecodeParms` value (or array items) with its target.
fn inline_indirect_entry(doc: &mut Document, object_id: ObjectId, key: &[u8]) {
    let resolved = match doc.objects.get(&object_id) {
        Some(Object::Stream(stream)) => match stream.dict.get(key) {
            Ok(Object::Reference(id)) => Some(doc.objects.get(id).cloned().unwrap_or(Object::Null)),
            Ok(Object::Array(items)) if items.iter().any(|o| matches!(o, Object::Reference(_))) => {
                let items = items
                    .iter()
                    .map(|item| match item {
                        Object::Reference(id) => {
                            doc.objects.get(id).cloned().unwrap_or_else(|| item.clone())
                        }
                        other => other.clone(),
                    })
                    .collect();
                Some(Object::Array(items))
            }
            _ => None,
        },
        _ => None,
    };

    if let Some(value) = resolved {
        if let Some(Object::Stream(stream)) = doc.objects.get_mut(&object_id) {
            stream.dict.set(key.to_vec(), value);
        }
    }
}

fn has_filter(stream: &Stream, filter: &[u8]) -> bool {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == filter,
        Ok(Object::Array(items)) => items
            .iter()
            .any(|o| matches!(o, Object::Name(name) if name == filter)),
        _ => false,
    }
}

/// Decompresses a stream, falling back to a raw zlib pass for Flate data lopdf rejects.
fn decompress(stream: &Stream) -> Result<Vec<u8>> {
    if !stream.dict.has(b"Filter") {
        return Ok(stream.content.clone());
    }
    match stream.decompressed_content() {
        Ok(content) => Ok(content),
        Err(e) if has_filter(stream, b"FlateDecode") => {
            log::debug!("lopdf could not inflate stream ({:?}), retrying with zlib", e);
            let mut decoder = flate2::read::ZlibDecoder::new(&stream.content[..]);
            let mut buffer = Vec::new();
            decoder
                .read_to_end(&mut buffer)
                .context("Manual zlib failed")?;
            Ok(buffer)
        }
        Err(e) => Err(anyhow!("Decompression failed: {:?}", e)),
    }
}

fn dimension(stream: &Stream, key: &[u8]) -> u32 {
    stream
        .dict
        .get(key)
        .and_then(Object::as_i64)
        .unwrap_or(0)
        .max(0) as u32
}

fn read_image(doc: &Document, object_id: ObjectId, actions: &mut Vec<String>) -> Result<SourceImage> {
    let Some(Object::Stream(stream)) = doc.objects.get(&object_id) else {
        return Err(anyhow!("Object not a stream"));
    };

    let content = if has_filter(stream, b"DCTDecode") {
        actions.push("was JPEG".to_string());
        // Keep the encoded JPEG; `image` decodes it below.
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())
    } else {
        decompress(stream)?
    };

    let width = dimension(stream, b"Width");
    let height = dimension(stream, b"Height");
    let pixels = width as usize * height as usize;

    if !has_filter(stream, b"DCTDecode") {
        let bits = stream.dict.get(b"BitsPerComponent").and_then(Object::as_i64);
        if let Ok(bits) = bits {
            if bits != 8 {
                return Err(anyhow!("Unsupported BitsPerComponent {}", bits));
            }
        }
    }

    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|value| resolve(doc, value));
    let components = match color_space {
        Some(space) => color_space_components(doc, space)?,
        None if content.len() == pixels => 1,
        None if content.len() == pixels * 4 => 4,
        None => 3,
    };

    Ok(SourceImage {
        width,
        height,
        components,
        content,
    })
}

/// Colour components per pixel for colour spaces the decoder can turn into RGB.
fn color_space_components(doc: &Document, space: &Object) -> Result<u8> {
    let (family, params) = match space {
        Object::Name(name) => (name.as_slice(), None),
        Object::Array(items) => match items.first().and_then(|o| o.as_name().ok()) {
            Some(name) => (name, items.get(1)),
            None => return Err(anyhow!("Malformed ColorSpace array")),
        },
        _ => return Err(anyhow!("Malformed ColorSpace")),
    };

    match family {
        b"DeviceGray" | b"CalGray" | b"G" => Ok(1),
        b"DeviceRGB" | b"CalRGB" | b"Lab" | b"RGB" => Ok(3),
        b"DeviceCMYK" | b"CMYK" => Ok(4),
        b"ICCBased" => {
            let n = params
                .and_then(|p| resolve(doc, p))
                .and_then(|p| p.as_stream().ok())
                .and_then(|p| p.dict.get(b"N").and_then(Object::as_i64).ok());
            match n {
                Some(1) => Ok(1),
                Some(4) => Ok(4),
                Some(3) | None => Ok(3),
                Some(other) => Err(anyhow!("Unsupported ICC component count {}", other)),
            }
        }
        other => Err(anyhow!(
            "Unsupported ColorSpace {}",
            String::from_utf8_lossy(other)
        )),
    }
}

fn decode_pixels(source: &SourceImage, actions: &mut Vec<String>) -> Result<DynamicImage> {
    let SourceImage {
        width,
        height,
        components,
        ref content,
    } = *source;

    let img = match components {
        1 => match GrayImage::from_raw(width, height, content.clone()) {
            Some(gray) => DynamicImage::ImageLuma8(gray),
            None => image::load_from_memory(content).context("Failed Gray")?,
        },
        3 => match RgbImage::from_raw(width, height, content.clone()) {
            Some(rgb) => DynamicImage::ImageRgb8(rgb),
            None => image::load_from_memory(content).context("Failed RGB")?,
        },
        4 => {
            actions.push("CMYK->RGB".to_string());
            match image::load_from_memory(content) {
                Ok(img) => img,
                Err(_) => DynamicImage::ImageRgb8(
                    RgbImage::from_raw(width, height, cmyk_to_rgb(content))
                        .ok_or(anyhow!("Failed CMYK->RGB"))?,
                ),
            }
        }
        other => return Err(anyhow!("Unsupported components {}", other)),
    };

    Ok(img)
}

fn cmyk_to_rgb(content: &[u8]) -> Vec<u8> {
    content
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let k = 1.0 - cmyk[3] as f32 / 255.0;
            [0, 1, 2].map(|i| ((1.0 - cmyk[i] as f32 / 255.0) * k * 255.0) as u8)
        })
        .collect()
}

/// Moves the soft mask into the alpha channel of `img`. Returns `false` when
/// the mask size does not match and was left alone.
fn apply_smask(doc: &Document, mask_id: ObjectId, img: &mut DynamicImage) -> Result<bool> {
    let Some(Object::Stream(stream)) = doc.objects.get(&mask_id) else {
        return Err(anyhow!("SMask not a stream"));
    };
    let (mw, mh) = (dimension(stream, b"Width"), dimension(stream, b"Height"));
    if (mw, mh) != img.dimensions() {
        return Ok(false);
    }

    let content = decompress(stream).context("Failed to decompress mask")?;
    let mask = GrayImage::from_raw(mw, mh, content).ok_or(anyhow!("Failed Mask"))?;

    let mut rgba = img.to_rgba8();
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        pixel[3] = mask.get_pixel(x, y)[0];
    }
    *img = DynamicImage::ImageRgba8(rgba);
    Ok(true)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb)?;
    Ok(buffer)
}

fn replace_with_jpeg(doc: &mut Document, object_id: ObjectId, jpeg: Vec<u8>, w: u32, h: u32) -> Result<()> {
    let Some(Object::Stream(stream)) = doc.objects.get_mut(&object_id) else {
        return Err(anyhow!("Object not a stream"));
    };
    stream.dict.set("Length", Object::Integer(jpeg.len() as i64));
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    stream.dict.set("Width", Object::Integer(w as i64));
    stream.dict.set("Height", Object::Integer(h as i64));
    stream.dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    stream.dict.set("BitsPerComponent", Object::Integer(8));
    stream.dict.remove(b"DecodeParms");
    stream.dict.remove(b"Decode");
    stream.content = jpeg;
    Ok(())
}

/// Writes colour as JPEG into the image and alpha as Flate into its mask.
fn write_rgb_with_alpha(
    doc: &mut Document,
    object_id: ObjectId,
    mask_id: ObjectId,
    img: &DynamicImage,
    quality: u8,
) -> Result<()> {
    let (w, h) = img.dimensions();
    let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p[3]).collect();

    replace_with_jpeg(doc, object_id, encode_jpeg(img, quality)?, w, h)?;

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(&alpha)?;
    let compressed = encoder.finish()?;

    let Some(Object::Stream(mask)) = doc.objects.get_mut(&mask_id) else {
        return Err(anyhow!("SMask not a stream"));
    };
    mask.dict.set("Length", Object::Integer(compressed.len() as i64));
    mask.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    mask.dict.set("Width", Object::Integer(w as i64));
    mask.dict.set("Height", Object::Integer(h as i64));
    mask.dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
    mask.dict.set("BitsPerComponent", Object::Integer(8));
    mask.dict.remove(b"DecodeParms");
    mask.dict.remove(b"Decode");
    mask.content = compressed;
    Ok(())
}
