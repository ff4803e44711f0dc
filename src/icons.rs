//! Allergen icon extraction from a 4×4 sprite sheet of round icons on a dark
//! background.
//!
//! Circles are located with Canny edges and a circular Hough transform, either
//! over the whole sheet (`smart`) or cell by cell (`grid`). A cell the
//! transform misses falls back to its roundest edge contour, then to its
//! largest bright region. Each icon is then
//! cropped to a square around its circle and written as a PNG whose alpha
//! channel hides everything outside the circle and the near-black background
//! inside it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{GrayImage, Luma, RgbImage, RgbaImage, Rgba};
use imageproc::contours::{BorderType, Contour, find_contours, find_contours_with_threshold};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{arc_length, contour_area, convex_hull};
use imageproc::point::Point;
use tracing::{info, warn};

pub const DEFAULT_OUTPUT_DIR: &str = "public/assets/allergens";

/// File names by grid position, row-major.
pub const ALLERGEN_NAMES: [[&str; 4]; 4] = [
    ["huevos", "pescado", "gluten", "leche"],
    ["lacteos", "cacahuetes", "sulfitos", "soja"],
    ["legumbres", "gluten-alt", "marisco", "moluscos"],
    ["gluten-alt2", "marisco-alt", "moluscos-alt", "moluscos-alt2"],
];

const GRID: u32 = 4;
const ICON_COUNT: usize = (GRID * GRID) as usize;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Share of a circle's perimeter that must sit on edges.
const HOUGH_THRESHOLD: f32 = 0.5;
/// Looser vote share for a single cell, where only one circle is expected.
const CELL_HOUGH_THRESHOLD: f32 = 0.4;
const MIN_CONTOUR_AREA: f64 = 100.0;
/// `4πA/P²` above which a contour counts as round.
const MIN_CIRCULARITY: f64 = 0.7;
const BLACK_THRESHOLD: u8 = 50;
const BRIGHT_THRESHOLD: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Method {
    /// Hough transform over the whole sheet, falling back to `grid`
    Smart,
    /// Per-cell circle search
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

impl Circle {
    fn distance_to(&self, x: f32, y: f32) -> f32 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedIcon {
    pub name: String,
    pub circle: Circle,
    pub path: PathBuf,
}

/// Integer offsets of a digital circle of radius `r`.
fn ring_offsets(r: u32) -> Vec<(i32, i32)> {
    let samples = (std::f32::consts::TAU * r as f32).ceil() as u32 * 2;
    let mut offsets: Vec<(i32, i32)> = (0..samples)
        .map(|k| {
            let theta = std::f32::consts::TAU * k as f32 / samples as f32;
            (
                (r as f32 * theta.cos()).round() as i32,
                (r as f32 * theta.sin()).round() as i32,
            )
        })
        .collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

/// Circular Hough transform over an edge map.
///
/// Votes are summed over a 3×3 neighbourhood and normalised by the ring
/// length; a centre needs a score of at least `threshold`. Candidates are kept
/// strongest first, dropping any whose centre is closer than `min_dist` to one
/// already kept.
pub fn hough_circles(
    edges: &GrayImage,
    min_radius: u32,
    max_radius: u32,
    min_dist: f32,
    threshold: f32,
) -> Vec<Circle> {
    let (width, height) = edges.dimensions();
    let min_radius = min_radius.max(1);
    if width == 0 || height == 0 || max_radius < min_radius {
        return Vec::new();
    }

    let points: Vec<(i32, i32)> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] > 0)
        .map(|(x, y, _)| (x as i32, y as i32))
        .collect();
    if points.is_empty() {
        return Vec::new();
    }

    let (w, h) = (width as i32, height as i32);
    let step = ((max_radius - min_radius) / 24).max(1) as usize;
    let mut votes = vec![0u32; (width * height) as usize];
    let mut candidates: Vec<(Circle, f32)> = Vec::new();

    for r in (min_radius..=max_radius).step_by(step) {
        votes.fill(0);
        let ring = ring_offsets(r);
        for &(px, py) in &points {
            for &(dx, dy) in &ring {
                let (cx, cy) = (px + dx, py + dy);
                if cx >= 0 && cy >= 0 && cx < w && cy < h {
                    votes[(cy * w + cx) as usize] += 1;
                }
            }
        }

        let perimeter = ring.len() as f32;
        for cy in 1..h - 1 {
            for cx in 1..w - 1 {
                let mut total = 0;
                for ny in cy - 1..=cy + 1 {
                    for nx in cx - 1..=cx + 1 {
                        total += votes[(ny * w + nx) as usize];
                    }
                }
                let score = total as f32 / perimeter;
                if score >= threshold {
                    candidates.push((Circle { x: cx as f32, y: cy as f32, r: r as f32 }, score));
                }
            }
        }
    }

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut found: Vec<Circle> = Vec::new();
    for (candidate, _) in candidates {
        if found.iter().all(|c| c.distance_to(candidate.x, candidate.y) >= min_dist) {
            found.push(candidate);
        }
    }
    found
}

fn crop_gray(gray: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
    image::imageops::crop_imm(gray, x, y, w, h).to_image()
}

/// Re-runs the transform in a window around a detected circle, with a
/// tighter radius range.
fn refine_circle(gray: &GrayImage, circle: Circle) -> Circle {
    let (width, height) = gray.dimensions();
    let reach = circle.r * 1.5;
    let x0 = (circle.x - reach).max(0.0) as u32;
    let y0 = (circle.y - reach).max(0.0) as u32;
    let x1 = ((circle.x + reach) as u32).min(width);
    let y1 = ((circle.y + reach) as u32).min(height);
    if x1 <= x0 || y1 <= y0 {
        return circle;
    }

    let window = crop_gray(gray, x0, y0, x1 - x0, y1 - y0);
    let edges = canny(&window, CANNY_LOW, CANNY_HIGH);
    let min_r = (circle.r * 0.8) as u32;
    let max_r = (circle.r * 1.2) as u32;
    match hough_circles(&edges, min_r, max_r, circle.r * 2.0, HOUGH_THRESHOLD).first() {
        Some(best) => Circle {
            x: best.x + x0 as f32,
            y: best.y + y0 as f32,
            r: best.r,
        },
        None => circle,
    }
}

/// Whole-sheet detection. `None` unless exactly sixteen circles are found.
pub fn detect_smart(gray: &GrayImage) -> Option<Vec<Circle>> {
    let (width, height) = gray.dimensions();
    let estimated = (width.min(height) / 8) as f32;
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let mut circles = hough_circles(
        &edges,
        (estimated * 0.7) as u32,
        (estimated * 1.3) as u32,
        estimated * 2.0,
        HOUGH_THRESHOLD,
    );
    if circles.len() != ICON_COUNT {
        warn!(
            "Detected {} circles, expected {}, using grid detection",
            circles.len(),
            ICON_COUNT
        );
        return None;
    }

    let row_height = height as f32 / GRID as f32;
    let row_of = |c: &Circle| (c.y / row_height).floor() as u32;
    circles.sort_by(|a, b| row_of(a).cmp(&row_of(b)).then(a.x.total_cmp(&b.x)));
    Some(circles.into_iter().map(|c| refine_circle(gray, c)).collect())
}

fn covers(circle: &Circle, (x, y): (f32, f32)) -> bool {
    circle.distance_to(x, y) <= circle.r + 1e-3
}

fn circle_through_two((ax, ay): (f32, f32), (bx, by): (f32, f32)) -> Circle {
    let (x, y) = ((ax + bx) / 2.0, (ay + by) / 2.0);
    let r = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt() / 2.0;
    Circle { x, y, r }
}

/// Circumcircle of a triangle; `None` when the points are collinear.
fn circle_through_three(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> Option<Circle> {
    let (bx, by) = (b.0 - a.0, b.1 - a.1);
    let (cx, cy) = (c.0 - a.0, c.1 - a.1);
    let d = 2.0 * (bx * cy - by * cx);
    if d.abs() < f32::EPSILON {
        return None;
    }
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;
    Some(Circle {
        x: a.0 + ux,
        y: a.1 + uy,
        r: (ux * ux + uy * uy).sqrt(),
    })
}

/// Smallest circle containing every point, computed over the convex hull.
fn min_enclosing_circle(points: &[Point<i32>]) -> Option<Circle> {
    // border traces revisit pixels; the hull's sort needs distinct points
    let mut distinct = points.to_vec();
    distinct.sort_unstable_by_key(|p| (p.x, p.y));
    distinct.dedup();
    let hull: Vec<(f32, f32)> = convex_hull(distinct)
        .into_iter()
        .map(|p| (p.x as f32, p.y as f32))
        .collect();
    let first = *hull.first()?;
    let mut circle = Circle { x: first.0, y: first.1, r: 0.0 };
    for i in 1..hull.len() {
        if covers(&circle, hull[i]) {
            continue;
        }
        circle = Circle { x: hull[i].0, y: hull[i].1, r: 0.0 };
        for j in 0..i {
            if covers(&circle, hull[j]) {
                continue;
            }
            circle = circle_through_two(hull[i], hull[j]);
            for k in 0..j {
                if !covers(&circle, hull[k]) {
                    circle = circle_through_three(hull[i], hull[j], hull[k]).unwrap_or(circle);
                }
            }
        }
    }
    Some(circle)
}

/// Outer borders of top-level regions, with their enclosed areas.
fn outer_contours(contours: Vec<Contour<i32>>) -> impl Iterator<Item = (Vec<Point<i32>>, f64)> {
    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            let area = contour_area(&c.points);
            (c.points, area)
        })
}

fn circularity(points: &[Point<i32>], area: f64) -> f64 {
    let perimeter = arc_length(points, true);
    if perimeter == 0.0 {
        return 0.0;
    }
    4.0 * std::f64::consts::PI * area / perimeter.powi(2)
}

/// Enclosing circle of the largest round contour on the cell's edge map.
fn edge_contour_circle(cell: &GrayImage) -> Option<Circle> {
    let edges = canny(cell, CANNY_LOW, CANNY_HIGH);
    outer_contours(find_contours(&edges))
        .filter(|(points, area)| *area >= MIN_CONTOUR_AREA && circularity(points, *area) > MIN_CIRCULARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .and_then(|(points, _)| min_enclosing_circle(&points))
}

/// Enclosing circle of the largest region brighter than the background.
fn bright_region_circle(cell: &GrayImage) -> Option<Circle> {
    outer_contours(find_contours_with_threshold(cell, BRIGHT_THRESHOLD))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .filter(|(_, area)| *area > MIN_CONTOUR_AREA)
        .and_then(|(points, _)| min_enclosing_circle(&points))
}

fn find_circle_in_cell(cell: &GrayImage) -> Circle {
    let (w, h) = cell.dimensions();
    let estimated = (w.min(h) / 2).saturating_sub(5) as f32;
    let (center_x, center_y) = ((w / 2) as f32, (h / 2) as f32);

    let edges = canny(cell, CANNY_LOW, CANNY_HIGH);
    let detected = hough_circles(
        &edges,
        (estimated * 0.7) as u32,
        (estimated * 1.3) as u32,
        estimated * 2.0,
        CELL_HOUGH_THRESHOLD,
    );
    let best = detected
        .into_iter()
        .map(|c| (c, c.r - 0.1 * c.distance_to(center_x, center_y)))
        .filter(|(_, score)| *score > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c);

    best.or_else(|| edge_contour_circle(cell))
        .or_else(|| bright_region_circle(cell))
        .unwrap_or(Circle {
            x: center_x,
            y: center_y,
            r: estimated,
        })
}

/// Per-cell detection; always yields sixteen circles.
pub fn detect_grid(gray: &GrayImage) -> Vec<Circle> {
    const MARGIN: u32 = 2;
    let (width, height) = gray.dimensions();
    let cell_w = width / GRID;
    let cell_h = height / GRID;
    let max_radius = (cell_w.min(cell_h) / 2).saturating_sub(2) as f32;

    let mut circles = Vec::with_capacity(ICON_COUNT);
    for row in 0..GRID {
        for col in 0..GRID {
            let left = (col * cell_w).saturating_sub(MARGIN);
            let top = (row * cell_h).saturating_sub(MARGIN);
            let right = ((col + 1) * cell_w + MARGIN).min(width);
            let bottom = ((row + 1) * cell_h + MARGIN).min(height);

            let cell = crop_gray(gray, left, top, right - left, bottom - top);
            let found = find_circle_in_cell(&cell);
            circles.push(Circle {
                x: (left as f32 + found.x).floor(),
                y: (top as f32 + found.y).floor(),
                r: found.r.floor().min(max_radius),
            });
        }
    }
    circles
}

/// Square crop around `circle` with a transparent outside and background.
pub fn extract_icon(rgb: &RgbImage, circle: Circle, padding: u32) -> RgbaImage {
    let (width, height) = rgb.dimensions();
    let size = ((circle.r.max(0.0) as u32) + padding) * 2;
    let half = (size / 2) as i64;
    let (cx, cy) = (circle.x as i64, circle.y as i64);

    let mut x1 = (cx - half).max(0);
    let mut y1 = (cy - half).max(0);
    let mut x2 = (cx + half).min(width as i64);
    let mut y2 = (cy + half).min(height as i64);
    if x2 - x1 < size as i64 {
        if x1 == 0 {
            x2 = (x1 + size as i64).min(width as i64);
        } else {
            x1 = (x2 - size as i64).max(0);
        }
    }
    if y2 - y1 < size as i64 {
        if y1 == 0 {
            y2 = (y1 + size as i64).min(height as i64);
        } else {
            y1 = (y2 - size as i64).max(0);
        }
    }

    let crop_w = (x2 - x1).max(1) as u32;
    let crop_h = (y2 - y1).max(1) as u32;
    let cropped = image::imageops::crop_imm(rgb, x1 as u32, y1 as u32, crop_w, crop_h).to_image();

    let mut circle_mask = GrayImage::new(crop_w, crop_h);
    draw_filled_circle_mut(
        &mut circle_mask,
        ((cx - x1) as i32, (cy - y1) as i32),
        circle.r as i32,
        Luma([255]),
    );

    let mut background = GrayImage::new(crop_w, crop_h);
    for (x, y, pixel) in cropped.enumerate_pixels() {
        let black = pixel.0.iter().all(|&c| c < BLACK_THRESHOLD);
        if black && circle_mask.get_pixel(x, y)[0] > 0 {
            background.put_pixel(x, y, Luma([255]));
        }
    }

    let soft_circle = gaussian_blur_f32(&circle_mask, 1.1);
    let soft_background = gaussian_blur_f32(&background, 0.8);

    RgbaImage::from_fn(crop_w, crop_h, |x, y| {
        let [r, g, b] = cropped.get_pixel(x, y).0;
        let inside = circle_mask.get_pixel(x, y)[0] > 0;
        let is_background = background.get_pixel(x, y)[0] > 0;
        let alpha = if inside && !is_background { 1.0 } else { 0.0 };
        let edge = soft_circle.get_pixel(x, y)[0] as f32 / 255.0;
        let fade = 1.0 - soft_background.get_pixel(x, y)[0] as f32 / 255.0 * 0.9;
        Rgba([r, g, b, (alpha * edge * fade * 255.0) as u8])
    })
}

/// Locates the sixteen icons, returning the method that produced them.
pub fn locate_icons(gray: &GrayImage, method: Method) -> (Method, Vec<Circle>) {
    if method == Method::Smart {
        if let Some(circles) = detect_smart(gray) {
            return (Method::Smart, circles);
        }
    }
    (Method::Grid, detect_grid(gray))
}

pub fn extract_icons(input: &Path, output_dir: &Path, method: Method) -> Result<Vec<ExtractedIcon>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let sheet = image::open(input).with_context(|| format!("Could not load image {}", input.display()))?;
    let rgb = sheet.to_rgb8();
    let gray = sheet.to_luma8();
    info!("Sprite sheet {}x{}", rgb.width(), rgb.height());

    let (used, circles) = locate_icons(&gray, method);
    let padding = if used == Method::Smart { 2 } else { 1 };

    let mut icons = Vec::with_capacity(circles.len());
    for (index, circle) in circles.into_iter().enumerate() {
        let name = ALLERGEN_NAMES[index / GRID as usize][index % GRID as usize].to_string();
        let path = output_dir.join(format!("{}.png", name));
        extract_icon(&rgb, circle, padding)
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(
            "{:<15} center ({:>4}, {:>4}) radius {:>3}px -> {}",
            name,
            circle.x,
            circle.y,
            circle.r,
            path.display()
        );
        icons.push(ExtractedIcon { name, circle, path });
    }
    Ok(icons)
}
