//! Upload endpoints.
//!
//! One request per connection, body delimited by Content-Length. Compressed
//! uploads must structurally decode before anything is stored; raw uploads
//! must match their declared geometry exactly and then run through the
//! byte-order disambiguator. Arrival order is never trusted; latest is
//! overwritten unconditionally.

use crate::disambiguate::{self, DisambiguationReport};
use crate::error::DecodeFault;
use crate::store::FrameStore;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use duolens_core::{PixelFormat, Side, wire};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde_json::{Value, json};
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// JPEG quality for server-side re-encodes of stitched halves.
const SPLIT_JPEG_QUALITY: u8 = 90;

pub fn router(store: Arc<FrameStore>) -> Router {
    Router::new()
        .route(wire::JPEG_UPLOAD_PATH, post(upload_jpeg))
        .route(wire::RAW_UPLOAD_PATH, post(upload_raw))
        .route(wire::HEALTH_PATH, get(healthz))
        .with_state(store)
}

async fn healthz() -> &'static str {
    "ok\n"
}

/// The upload's addressee: one side, or a stitched pair to split.
enum Addressee {
    Side(Side),
    Stitched,
}

fn addressee(headers: &HeaderMap) -> Result<Addressee, DecodeFault> {
    match header_str(headers, wire::HDR_SIDE) {
        None | Some("S") => Ok(Addressee::Stitched),
        Some(s) => Side::from_str(s)
            .map(Addressee::Side)
            .map_err(|_| DecodeFault::BadHeader(wire::HDR_SIDE)),
    }
}

/// The raw path carries no image container, so the lane tag is mandatory.
fn required_addressee(headers: &HeaderMap) -> Result<Addressee, DecodeFault> {
    if header_str(headers, wire::HDR_SIDE).is_none() {
        return Err(DecodeFault::MissingHeader(wire::HDR_SIDE));
    }
    addressee(headers)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn required_header<T: FromStr>(headers: &HeaderMap, name: &'static str) -> Result<T, DecodeFault> {
    header_str(headers, name)
        .ok_or(DecodeFault::MissingHeader(name))?
        .parse()
        .map_err(|_| DecodeFault::BadHeader(name))
}

async fn upload_jpeg(
    State(store): State<Arc<FrameStore>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, DecodeFault> {
    if body.is_empty() {
        return Err(DecodeFault::Empty);
    }
    // Structural validation before anything touches disk.
    if !matches!(image::guess_format(&body), Ok(ImageFormat::Jpeg)) {
        return Err(DecodeFault::NotAnImage("no jpeg signature".into()));
    }
    let decoded =
        image::load_from_memory(&body).map_err(|e| DecodeFault::NotAnImage(e.to_string()))?;

    let frame_id = header_str(&headers, wire::HDR_FRAME_ID).map(str::to_owned);
    match addressee(&headers)? {
        Addressee::Side(side) => {
            let stored = store.store_jpeg(side, frame_id.as_deref(), &body).await?;
            info!("accepted jpeg {} for {}", frame_id.as_deref().unwrap_or("-"), side);
            Ok(Json(json!({
                "ok": true,
                "frame_id": frame_id,
                "stored": stored.archive.display().to_string(),
            })))
        }
        Addressee::Stitched => {
            // Expected layout [L|R]: archive the stitched original, then
            // split and promote each half to its side's latest.
            let stitched = store
                .store_stitched(frame_id.as_deref(), "jpg", &body)
                .await?;
            let (left, right) = split_halves(&decoded);
            let left_jpeg = encode_jpeg(&left)?;
            let right_jpeg = encode_jpeg(&right)?;
            let stored_left = store
                .store_jpeg(Side::Left, frame_id.as_deref(), &left_jpeg)
                .await?;
            let stored_right = store
                .store_jpeg(Side::Right, frame_id.as_deref(), &right_jpeg)
                .await?;
            info!("accepted stitched jpeg {}", frame_id.as_deref().unwrap_or("-"));
            Ok(Json(json!({
                "ok": true,
                "frame_id": frame_id,
                "stitched": stitched.display().to_string(),
                "left": stored_left.archive.display().to_string(),
                "right": stored_right.archive.display().to_string(),
            })))
        }
    }
}

async fn upload_raw(
    State(store): State<Arc<FrameStore>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, DecodeFault> {
    if body.is_empty() {
        return Err(DecodeFault::Empty);
    }
    let width: u32 = required_header(&headers, wire::HDR_WIDTH)?;
    let height: u32 = required_header(&headers, wire::HDR_HEIGHT)?;
    let format: PixelFormat = required_header(&headers, wire::HDR_PIXEL_FORMAT)?;
    let addressee = required_addressee(&headers)?;
    let expected = width as usize * height as usize * format.bytes_per_pixel();
    if body.len() != expected {
        return Err(DecodeFault::LengthMismatch {
            width,
            height,
            format: format.as_str(),
            expected,
            got: body.len(),
        });
    }

    // The sender's 16-bit byte order is not declared; recover it blind.
    let (rendered, report) = match format {
        PixelFormat::Rgb565 => {
            let (image, report) = disambiguate::disambiguate(&body, width, height);
            (DynamicImage::ImageRgb8(image), Some(report))
        }
        PixelFormat::Grayscale => {
            let gray = image::GrayImage::from_raw(width, height, body.to_vec())
                .ok_or_else(|| DecodeFault::NotAnImage("grayscale buffer".into()))?;
            (DynamicImage::ImageLuma8(gray), None)
        }
    };

    let frame_id = header_str(&headers, wire::HDR_FRAME_ID).map(str::to_owned);
    let stored = match addressee {
        Addressee::Side(side) => {
            let png = encode_png(&rendered)?;
            let stored = store.store_raw(side, frame_id.as_deref(), &body, &png).await?;
            json!({ "stored": stored.archive.display().to_string() })
        }
        Addressee::Stitched => {
            let archive = store.store_stitched(frame_id.as_deref(), "bin", &body).await?;
            let (left, right) = split_halves(&rendered);
            let (left_raw, right_raw) =
                split_raw_rows(&body, width, height, format.bytes_per_pixel());
            let stored_left = store
                .store_raw(Side::Left, frame_id.as_deref(), &left_raw, &encode_png(&left)?)
                .await?;
            let stored_right = store
                .store_raw(Side::Right, frame_id.as_deref(), &right_raw, &encode_png(&right)?)
                .await?;
            json!({
                "stitched": archive.display().to_string(),
                "left": stored_left.archive.display().to_string(),
                "right": stored_right.archive.display().to_string(),
            })
        }
    };

    info!(
        "accepted raw {} {}x{} {}",
        frame_id.as_deref().unwrap_or("-"),
        width,
        height,
        format.as_str()
    );
    let mut response = json!({ "ok": true, "frame_id": frame_id });
    merge(&mut response, stored);
    if let Some(report) = report {
        merge(&mut response, report_json(&report));
    }
    Ok(Json(response))
}

fn report_json(report: &DisambiguationReport) -> Value {
    json!({
        "byte_order": report.order.as_str(),
        "little_score": report.little_score,
        "big_score": report.big_score,
    })
}

fn merge(target: &mut Value, extra: Value) {
    if let (Some(t), Some(e)) = (target.as_object_mut(), extra.as_object()) {
        for (k, v) in e {
            t.insert(k.clone(), v.clone());
        }
    }
}

/// Split `[L|R]` down the middle; odd widths floor the midpoint.
fn split_halves(img: &DynamicImage) -> (DynamicImage, DynamicImage) {
    let (w, h) = (img.width(), img.height());
    let mid = w / 2;
    (img.crop_imm(0, 0, mid, h), img.crop_imm(mid, 0, w - mid, h))
}

/// Same split on the row-major raw buffer.
fn split_raw_rows(body: &[u8], width: u32, height: u32, bpp: usize) -> (Vec<u8>, Vec<u8>) {
    let row = width as usize * bpp;
    let mid = (width / 2) as usize * bpp;
    let mut left = Vec::with_capacity(mid * height as usize);
    let mut right = Vec::with_capacity((row - mid) * height as usize);
    for y in 0..height as usize {
        let start = y * row;
        left.extend_from_slice(&body[start..start + mid]);
        right.extend_from_slice(&body[start + mid..start + row]);
    }
    (left, right)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, DecodeFault> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, SPLIT_JPEG_QUALITY);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, DecodeFault> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}
