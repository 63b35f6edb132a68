//! On-the-fly PNG generation: gradients, text badges, placeholder images,
//! and bar charts, all driven by query parameters.

mod draw;

use std::collections::HashMap;
use std::io::Cursor;

use axum::extract::Query;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use image::{ImageFormat, Rgb, RgbImage};
use rand::Rng;

use edgeside::{Worker, WorkerManifest};

use crate::draw::{
    draw_line, draw_rect_outline, draw_text, fill_rect, text_height, text_width,
};

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Image generation</title></head>
<body>
  <h1>Image generation</h1>
  <ul>
    <li><a href="/gradient?width=800&height=400">/gradient</a> - two-color vertical gradient (random colors when unset)</li>
    <li><a href="/badge?text=Hello+World">/badge</a> - text badge</li>
    <li><a href="/placeholder?width=400&height=300">/placeholder</a> - placeholder with dimensions</li>
    <li><a href="/chart?values=10,25,15,30,20&labels=A,B,C,D,E">/chart</a> - bar chart</li>
  </ul>
</body>
</html>
"#;

pub fn worker() -> edgeside::Result<Worker> {
    let manifest = WorkerManifest::from_str(include_str!("../worker.toml"))?;
    let router = Router::new()
        .route("/", get(index))
        .route("/gradient", get(gradient))
        .route("/badge", get(badge))
        .route("/placeholder", get(placeholder))
        .route("/chart", get(chart));
    Worker::builder().manifest(manifest).router(router).build()
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn gradient(Query(params): Query<HashMap<String, String>>) -> Response {
    let (width, height) = match dimensions(&params, 800, 400) {
        Ok(size) => size,
        Err(message) => return bad_request(message),
    };
    let top = match color_or_random(&params, "color1") {
        Ok(color) => color,
        Err(message) => return bad_request(message),
    };
    let bottom = match color_or_random(&params, "color2") {
        Ok(color) => color,
        Err(message) => return bad_request(message),
    };

    let mut image = RgbImage::new(width, height);
    for y in 0..height {
        let t = if height > 1 {
            y as f64 / (height - 1) as f64
        } else {
            0.0
        };
        let row = lerp(top, bottom, t);
        for x in 0..width {
            image.put_pixel(x, y, row);
        }
    }
    png_response(image)
}

async fn badge(Query(params): Query<HashMap<String, String>>) -> Response {
    let text = params.get("text").map(String::as_str).unwrap_or("Hello World");
    let bg = match color(&params, "bg", Rgb([0x4c, 0xaf, 0x50])) {
        Ok(color) => color,
        Err(message) => return bad_request(message),
    };
    let text_color = match color(&params, "text_color", Rgb([0xff, 0xff, 0xff])) {
        Ok(color) => color,
        Err(message) => return bad_request(message),
    };

    let scale = 2;
    let padding = 20;
    let width = text_width(text, scale) + padding * 2;
    let height = text_height(scale) + padding * 2;

    let mut image = RgbImage::from_pixel(width, height, bg);
    draw_text(&mut image, text, padding as i64, padding as i64, scale, text_color);
    png_response(image)
}

async fn placeholder(Query(params): Query<HashMap<String, String>>) -> Response {
    let (width, height) = match dimensions(&params, 400, 300) {
        Ok(size) => size,
        Err(message) => return bad_request(message),
    };
    let bg = match color(&params, "bg", Rgb([0xcc, 0xcc, 0xcc])) {
        Ok(color) => color,
        Err(message) => return bad_request(message),
    };
    let fg = match color(&params, "fg", Rgb([0x66, 0x66, 0x66])) {
        Ok(color) => color,
        Err(message) => return bad_request(message),
    };

    let mut image = RgbImage::from_pixel(width, height, bg);
    let right = width as i64 - 1;
    let bottom = height as i64 - 1;
    draw_line(&mut image, 0, 0, right, bottom, 1, fg);
    draw_line(&mut image, right, 0, 0, bottom, 1, fg);
    draw_rect_outline(&mut image, 0, 0, width, height, fg);

    // Blank out a patch behind the label so the diagonals do not cross it.
    let label = format!("{width} x {height}");
    let scale = 2;
    let label_w = text_width(&label, scale);
    let label_h = text_height(scale);
    let x = (width as i64 - label_w as i64) / 2;
    let y = (height as i64 - label_h as i64) / 2;
    fill_rect(&mut image, x - 4, y - 4, label_w + 8, label_h + 8, bg);
    draw_text(&mut image, &label, x, y, scale, fg);
    png_response(image)
}

async fn chart(Query(params): Query<HashMap<String, String>>) -> Response {
    let (width, height) = match dimensions(&params, 600, 400) {
        Ok(size) => size,
        Err(message) => return bad_request(message),
    };
    let values = match parse_values(params.get("values").map(String::as_str)) {
        Ok(values) => values,
        Err(message) => return bad_request(message),
    };
    let labels: Vec<&str> = params
        .get("labels")
        .map(String::as_str)
        .unwrap_or("A,B,C,D,E")
        .split(',')
        .map(str::trim)
        .collect();
    let bar_color = match color(&params, "color", Rgb([0x21, 0x96, 0xf3])) {
        Ok(color) => color,
        Err(message) => return bad_request(message),
    };

    let padding: u32 = 50;
    if width <= padding * 2 + 20 || height <= padding * 2 + 20 {
        return bad_request("image too small for a chart".to_owned());
    }

    let white = Rgb([0xff, 0xff, 0xff]);
    let black = Rgb([0x00, 0x00, 0x00]);
    let mut image = RgbImage::from_pixel(width, height, white);

    let left = padding as i64;
    let top = padding as i64;
    let right = (width - padding) as i64;
    let baseline = (height - padding) as i64;
    draw_line(&mut image, left, top, left, baseline, 2, black);
    draw_line(&mut image, left, baseline, right, baseline, 2, black);

    if let Some(title) = params.get("title") {
        let x = (width as i64 - text_width(title, 2) as i64) / 2;
        draw_text(&mut image, title, x, 10, 2, black);
    }

    let chart_width = width - padding * 2;
    let chart_height = height - padding * 2;
    let max = values.iter().cloned().fold(0.0_f64, f64::max).max(1.0);
    let count = values.len() as u32;
    let slot = chart_width / count;
    let bar_width = (chart_width / (count * 2)).max(1);

    for (i, value) in values.iter().enumerate() {
        // Leave 20px of headroom above the tallest bar for its value label.
        let bar_height = (value / max * (chart_height as f64 - 20.0)).round() as u32;
        let slot_x = left + (i as u32 * slot) as i64;
        let bar_x = slot_x + ((slot - bar_width) / 2) as i64;
        let bar_top = baseline - bar_height as i64;
        fill_rect(&mut image, bar_x, bar_top, bar_width, bar_height, bar_color);

        let value_label = format_value(*value);
        let value_x = slot_x + (slot as i64 - text_width(&value_label, 1) as i64) / 2;
        draw_text(&mut image, &value_label, value_x, bar_top - 12, 1, black);

        if let Some(label) = labels.get(i) {
            let label_x = slot_x + (slot as i64 - text_width(label, 1) as i64) / 2;
            draw_text(&mut image, label, label_x, baseline + 6, 1, black);
        }
    }
    png_response(image)
}

fn dimensions(
    params: &HashMap<String, String>,
    default_width: u32,
    default_height: u32,
) -> Result<(u32, u32), String> {
    Ok((
        dimension(params.get("width"), default_width)?,
        dimension(params.get("height"), default_height)?,
    ))
}

fn dimension(raw: Option<&String>, default: u32) -> Result<u32, String> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<u32>() {
        Ok(value) if (1..=2000).contains(&value) => Ok(value),
        _ => Err(format!("'{raw}' is not a valid dimension (expected 1-2000)")),
    }
}

fn color(
    params: &HashMap<String, String>,
    key: &str,
    default: Rgb<u8>,
) -> Result<Rgb<u8>, String> {
    match params.get(key) {
        Some(raw) => hex_color(raw),
        None => Ok(default),
    }
}

fn color_or_random(params: &HashMap<String, String>, key: &str) -> Result<Rgb<u8>, String> {
    match params.get(key) {
        Some(raw) => hex_color(raw),
        None => Ok(Rgb(rand::thread_rng().r#gen::<[u8; 3]>())),
    }
}

fn hex_color(raw: &str) -> Result<Rgb<u8>, String> {
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("'{raw}' is not a valid hex color"));
    }
    let parse = |range| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|_| format!("'{raw}' is not a valid hex color"))
    };
    Ok(Rgb([parse(0..2)?, parse(2..4)?, parse(4..6)?]))
}

fn lerp(from: Rgb<u8>, to: Rgb<u8>, t: f64) -> Rgb<u8> {
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    Rgb([
        mix(from.0[0], to.0[0]),
        mix(from.0[1], to.0[1]),
        mix(from.0[2], to.0[2]),
    ])
}

fn parse_values(raw: Option<&str>) -> Result<Vec<f64>, String> {
    let raw = raw.unwrap_or("10,25,15,30,20");
    let mut values = Vec::new();
    for part in raw.split(',') {
        let value: f64 = part
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a number", part.trim()))?;
        if value < 0.0 {
            return Err("values must be non-negative".to_owned());
        }
        values.push(value);
    }
    if values.is_empty() {
        return Err("values must not be empty".to_owned());
    }
    if values.len() > 24 {
        return Err("too many values (max 24)".to_owned());
    }
    Ok(values)
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.1}")
    }
}

fn png_response(image: RgbImage) -> Response {
    let mut bytes = Vec::new();
    if let Err(err) = image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode png: {err}"),
        )
            .into_response();
    }
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        bytes,
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}
