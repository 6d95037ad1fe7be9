//! QR 码 SVG 渲染
//!
//! 纠错等级 H + 4 模块静区，viewport 约 1000px。设计参数（前景/背景色、
//! 码眼形状、模块样式、居中 logo）来自 qr_codes 的设计列。
//!
//! 输出 SVG 矢量图：logo 占边长 25%，带留白底板，配合 H 级纠错不会破坏
//! 可解码性。

use std::fmt::Write as _;

use qrcode::{Color, EcLevel, QrCode as Encoder};

use crate::errors::{QrifyError, Result};
use crate::storage::QrCode;

/// 静区宽度（模块数）
const QUIET_ZONE: u32 = 4;
/// SVG viewport 边长（px）
const VIEWPORT: u32 = 1000;
/// Logo 占整图边长的比例
const LOGO_RATIO: f64 = 0.25;
/// Logo 底板相对 logo 的留白比例
const LOGO_PADDING_RATIO: f64 = 0.08;

/// 渲染用的设计参数
#[derive(Debug, Clone)]
pub struct QrDesign {
    pub foreground_color: String,
    pub background_color: String,
    pub gradient: Option<String>,
    pub eye_shape: String,
    pub module_style: String,
    pub logo_data: Option<String>,
}

impl Default for QrDesign {
    fn default() -> Self {
        Self {
            foreground_color: "#000000".to_string(),
            background_color: "#ffffff".to_string(),
            gradient: None,
            eye_shape: "square".to_string(),
            module_style: "square".to_string(),
            logo_data: None,
        }
    }
}

impl From<&QrCode> for QrDesign {
    fn from(qr: &QrCode) -> Self {
        Self {
            foreground_color: qr.foreground_color.clone(),
            background_color: qr.background_color.clone(),
            gradient: qr.gradient.clone(),
            eye_shape: qr.eye_shape.clone(),
            module_style: qr.module_style.clone(),
            logo_data: qr.logo_data.clone(),
        }
    }
}

/// 判断 (x, y) 是否落在三个 7x7 码眼区域内
fn in_finder(x: u32, y: u32, width: u32) -> bool {
    let tl = x < 7 && y < 7;
    let tr = x >= width - 7 && y < 7;
    let bl = x < 7 && y >= width - 7;
    tl || tr || bl
}

/// 渲染数据为 SVG 字符串
pub fn render_qr_svg(data: &str, design: &QrDesign) -> Result<String> {
    if data.is_empty() {
        return Err(QrifyError::qr_render("cannot encode empty data"));
    }

    let code = Encoder::with_error_correction_level(data.as_bytes(), EcLevel::H)
        .map_err(|e| QrifyError::qr_render(format!("QR encoding failed: {}", e)))?;

    let width = code.width() as u32;
    let size = width + 2 * QUIET_ZONE;
    let colors = code.to_colors();

    let fg = sanitize_color(&design.foreground_color, "#000000");
    let bg = sanitize_color(&design.background_color, "#ffffff");

    let mut svg = String::with_capacity(32 * 1024);
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{vp}" height="{vp}" viewBox="0 0 {size} {size}" shape-rendering="crispEdges">"#,
        vp = VIEWPORT,
        size = size
    );

    // 渐变定义（"#from,#to" 形式；非法值回退为纯色前景）
    let fill = match parse_gradient(design.gradient.as_deref()) {
        Some((from, to)) => {
            let _ = write!(
                svg,
                r#"<defs><linearGradient id="g" x1="0" y1="0" x2="1" y2="1"><stop offset="0" stop-color="{}"/><stop offset="1" stop-color="{}"/></linearGradient></defs>"#,
                from, to
            );
            "url(#g)".to_string()
        }
        None => fg.clone(),
    };

    // 背景
    let _ = write!(
        svg,
        r#"<rect width="{size}" height="{size}" fill="{bg}"/>"#,
        size = size,
        bg = bg
    );

    // 数据模块（码眼区域单独画）
    let dots = design.module_style == "dots";
    let rounded = design.module_style == "rounded";
    for y in 0..width {
        for x in 0..width {
            if colors[(y * width + x) as usize] != Color::Dark || in_finder(x, y, width) {
                continue;
            }
            let px = x + QUIET_ZONE;
            let py = y + QUIET_ZONE;
            if dots {
                let _ = write!(
                    svg,
                    r#"<circle cx="{}.5" cy="{}.5" r="0.45" fill="{}"/>"#,
                    px, py, fill
                );
            } else if rounded {
                let _ = write!(
                    svg,
                    r#"<rect x="{}" y="{}" width="1" height="1" rx="0.3" fill="{}"/>"#,
                    px, py, fill
                );
            } else {
                let _ = write!(
                    svg,
                    r#"<rect x="{}" y="{}" width="1" height="1" fill="{}"/>"#,
                    px, py, fill
                );
            }
        }
    }

    // 码眼：外 7x7 环 + 内 3x3 实心
    let round_eyes = design.eye_shape == "circle";
    for (ex, ey) in [(0u32, 0u32), (width - 7, 0), (0, width - 7)] {
        draw_finder_eye(&mut svg, ex + QUIET_ZONE, ey + QUIET_ZONE, &fill, &bg, round_eyes);
    }

    // 居中 logo（data URI），带留白底板
    if let Some(ref logo) = design.logo_data
        && is_valid_logo_data_uri(logo)
    {
        let logo_edge = size as f64 * LOGO_RATIO;
        let pad = logo_edge * LOGO_PADDING_RATIO;
        let backing = logo_edge + 2.0 * pad;
        let backing_pos = (size as f64 - backing) / 2.0;
        let logo_pos = (size as f64 - logo_edge) / 2.0;
        let _ = write!(
            svg,
            r#"<rect x="{bx:.2}" y="{bx:.2}" width="{bw:.2}" height="{bw:.2}" rx="{rx:.2}" fill="{bg}"/>"#,
            bx = backing_pos,
            bw = backing,
            rx = pad,
            bg = bg
        );
        let _ = write!(
            svg,
            r#"<image x="{lx:.2}" y="{lx:.2}" width="{lw:.2}" height="{lw:.2}" href="{logo}" preserveAspectRatio="xMidYMid meet"/>"#,
            lx = logo_pos,
            lw = logo_edge,
            logo = logo
        );
    }

    svg.push_str("</svg>");
    Ok(svg)
}

fn draw_finder_eye(svg: &mut String, x: u32, y: u32, fill: &str, bg: &str, round: bool) {
    if round {
        let cx = x as f64 + 3.5;
        let _ = write!(
            svg,
            r#"<circle cx="{cx}" cy="{cx_y}" r="3.5" fill="{fill}"/><circle cx="{cx}" cy="{cx_y}" r="2.5" fill="{bg}"/><circle cx="{cx}" cy="{cx_y}" r="1.5" fill="{fill}"/>"#,
            cx = cx,
            cx_y = y as f64 + 3.5,
            fill = fill,
            bg = bg
        );
    } else {
        let _ = write!(
            svg,
            r#"<rect x="{x}" y="{y}" width="7" height="7" fill="{fill}"/><rect x="{x1}" y="{y1}" width="5" height="5" fill="{bg}"/><rect x="{x2}" y="{y2}" width="3" height="3" fill="{fill}"/>"#,
            x = x,
            y = y,
            x1 = x + 1,
            y1 = y + 1,
            x2 = x + 2,
            y2 = y + 2,
            fill = fill,
            bg = bg
        );
    }
}

/// logo 白名单校验：光栅图的 base64 data URI 才能进 href 属性
///
/// 放行的字符集只有 base64 字母表，引号和尖括号进不来，
/// 所以 href 不需要再做 XML 转义。
fn is_valid_logo_data_uri(logo: &str) -> bool {
    let Some(rest) = logo.strip_prefix("data:image/") else {
        return false;
    };
    let Some((mime, payload)) = rest.split_once(";base64,") else {
        return false;
    };
    if !matches!(mime, "png" | "jpeg" | "gif" | "webp") {
        return false;
    }
    !payload.is_empty()
        && payload
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

/// 颜色值白名单校验（#rgb / #rrggbb），防止 SVG 属性注入
fn sanitize_color(color: &str, fallback: &str) -> String {
    let c = color.trim();
    let valid = (c.len() == 4 || c.len() == 7)
        && c.starts_with('#')
        && c[1..].bytes().all(|b| b.is_ascii_hexdigit());
    if valid {
        c.to_lowercase()
    } else {
        fallback.to_string()
    }
}

/// 解析 "#from,#to" 渐变描述
fn parse_gradient(gradient: Option<&str>) -> Option<(String, String)> {
    let g = gradient?.trim();
    let (from, to) = g.split_once(',')?;
    let from = sanitize_color(from, "");
    let to = sanitize_color(to, "");
    if from.is_empty() || to.is_empty() {
        return None;
    }
    Some((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic_svg() {
        let svg = render_qr_svg("https://example.com/r/aB3xY9k", &QrDesign::default()).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(r#"width="1000""#));
        assert!(svg.contains("#000000"));
        assert!(svg.contains("#ffffff"));
    }

    #[test]
    fn test_render_empty_data_fails() {
        assert!(render_qr_svg("", &QrDesign::default()).is_err());
    }

    #[test]
    fn test_render_custom_colors() {
        let design = QrDesign {
            foreground_color: "#1A2B3C".to_string(),
            background_color: "#FAFAFA".to_string(),
            ..QrDesign::default()
        };
        let svg = render_qr_svg("test", &design).unwrap();

        assert!(svg.contains("#1a2b3c"));
        assert!(svg.contains("#fafafa"));
    }

    #[test]
    fn test_invalid_color_falls_back() {
        let design = QrDesign {
            foreground_color: "\"><script>".to_string(),
            ..QrDesign::default()
        };
        let svg = render_qr_svg("test", &design).unwrap();

        assert!(!svg.contains("script"));
        assert!(svg.contains("#000000"));
    }

    #[test]
    fn test_dots_style_emits_circles() {
        let design = QrDesign {
            module_style: "dots".to_string(),
            ..QrDesign::default()
        };
        let svg = render_qr_svg("test", &design).unwrap();

        assert!(svg.contains("<circle"));
    }

    #[test]
    fn test_logo_embeds_image_with_backing() {
        let design = QrDesign {
            logo_data: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
            ..QrDesign::default()
        };
        let svg = render_qr_svg("test", &design).unwrap();

        assert!(svg.contains("<image"));
        assert!(svg.contains("data:image/png;base64,"));
    }

    #[test]
    fn test_non_data_uri_logo_is_ignored() {
        let design = QrDesign {
            logo_data: Some("https://evil.example.com/x.png".to_string()),
            ..QrDesign::default()
        };
        let svg = render_qr_svg("test", &design).unwrap();

        assert!(!svg.contains("<image"));
    }

    #[test]
    fn test_logo_attribute_breakout_is_rejected() {
        // 前缀合法但 payload 带引号和标签，整个 logo 必须被丢弃
        let design = QrDesign {
            logo_data: Some(
                r#"data:image/png;base64,x"/><script>alert(1)</script><image href=""#.to_string(),
            ),
            ..QrDesign::default()
        };
        let svg = render_qr_svg("test", &design).unwrap();

        assert!(!svg.contains("<script"));
        assert!(!svg.contains("<image"));
        assert!(!svg.contains("alert"));
    }

    #[test]
    fn test_logo_mime_whitelist() {
        // svg+xml 作为嵌入 logo 可以携带脚本，不在白名单内
        for rejected in [
            "data:image/svg+xml;base64,PHN2Zz4=",
            "data:image/png;base64,",
            "data:image/png,rawdata",
        ] {
            let design = QrDesign {
                logo_data: Some(rejected.to_string()),
                ..QrDesign::default()
            };
            let svg = render_qr_svg("test", &design).unwrap();
            assert!(!svg.contains("<image"), "accepted: {}", rejected);
        }

        let design = QrDesign {
            logo_data: Some("data:image/webp;base64,UklGRg==".to_string()),
            ..QrDesign::default()
        };
        let svg = render_qr_svg("test", &design).unwrap();
        assert!(svg.contains("<image"));
    }

    #[test]
    fn test_gradient_definition() {
        let design = QrDesign {
            gradient: Some("#ff0000,#0000ff".to_string()),
            ..QrDesign::default()
        };
        let svg = render_qr_svg("test", &design).unwrap();

        assert!(svg.contains("linearGradient"));
        assert!(svg.contains("url(#g)"));
    }
}
