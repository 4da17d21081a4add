use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::Luma;
use qrcode::QrCode;
use serde::Serialize;
use std::io::Cursor;

pub const QR_WIDTH: u32 = 300;

/// What the scanner decodes. Field names are the wire contract with the
/// scanner app, hence camelCase.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload<'a> {
    pub student_id: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
}

/// Render the payload as a PNG data URL suitable for an <img> tag.
pub fn data_url(payload: &QrPayload) -> anyhow::Result<String> {
    let json = serde_json::to_string(payload)?;

    let code = QrCode::new(json.as_bytes())?;
    let img = code
        .render::<Luma<u8>>()
        .max_dimensions(QR_WIDTH, QR_WIDTH)
        .build();

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_png_data_url() {
        let url = data_url(&QrPayload {
            student_id: "STU123",
            first_name: "Jane",
            last_name: "Doe",
            email: "jane@campus.edu",
        })
        .unwrap();

        assert!(url.starts_with("data:image/png;base64,"));
        // sanity: decodes back to PNG magic bytes
        let bytes = STANDARD.decode(&url["data:image/png;base64,".len()..]).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn payload_uses_scanner_field_names() {
        let json = serde_json::to_string(&QrPayload {
            student_id: "STU123",
            first_name: "Jane",
            last_name: "Doe",
            email: "jane@campus.edu",
        })
        .unwrap();
        assert!(json.contains("\"studentId\""));
        assert!(json.contains("\"firstName\""));
    }
}
