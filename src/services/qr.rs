use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;

/// Renders `url` as a PNG QR code embedded in a `data:` URI.
pub fn make_qrcode(url: &str) -> Result<String> {
    let code = QrCode::new(url.as_bytes()).context("QR payload too large")?;
    let rendered = code.render::<Luma<u8>>().build();

    let mut png = Vec::new();
    rendered
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("PNG encoding failed")?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}
