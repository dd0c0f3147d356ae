use crate::core::FaceRect;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{self, ClearType},
};
use image::DynamicImage;
use std::io::{self, Write};

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        // Half resolution keeps redraws cheap.
        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)).max(1),
            height: height
                .unwrap_or((term_height.saturating_sub(5) / 2).min(DEFAULT_HEIGHT / 2))
                .max(1),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Frame as ASCII art with the tracked face box and a status line
    /// centred above it.
    pub fn render(&self, image: &DynamicImage, face: Option<&FaceRect>, status: &str) -> String {
        let mut grid = self.image_to_ascii(image);

        if let Some(face) = face {
            let (x1, y1, x2, _) = self.to_cells(face);
            if !status.is_empty() {
                self.overlay_text(&mut grid, status, (x1 + x2) / 2, y1.saturating_sub(1));
            }
            self.draw_face_box(&mut grid, face);
        } else if !status.is_empty() {
            self.overlay_text(&mut grid, status, self.width / 2, self.height / 2);
        }

        self.grid_to_string(&grid)
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let ramp: Vec<char> = ASCII_RAMP.chars().collect();

        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();

        for (term_y, row) in grid.iter_mut().enumerate() {
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0] as usize;
                    *cell = ramp[brightness * (ramp.len() - 1) / 255];
                }
            }
        }

        grid
    }

    /// Percent rectangle to cell corners, clamped to the grid.
    fn to_cells(&self, face: &FaceRect) -> (usize, usize, usize, usize) {
        let cell = |pct: f32, span: usize| ((pct / 100.0 * span as f32).max(0.0) as usize).min(span - 1);
        (
            cell(face.left, self.width),
            cell(face.top, self.height),
            cell(face.left + face.width, self.width),
            cell(face.top + face.height, self.height),
        )
    }

    fn overlay_text(&self, grid: &mut [Vec<char>], text: &str, center_x: usize, y: usize) {
        if y >= self.height {
            return;
        }
        let start_x = center_x.saturating_sub(text.chars().count() / 2);
        for (i, ch) in text.chars().enumerate() {
            let x = start_x + i;
            if x < self.width {
                grid[y][x] = ch;
            }
        }
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceRect) {
        let (x1, y1, x2, y2) = self.to_cells(face);
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        for x in x1 + 1..x2 {
            grid[y1][x] = '─';
            grid[y2][x] = '─';
        }
        for row in grid.iter_mut().take(y2).skip(y1 + 1) {
            row[x1] = '│';
            row[x2] = '│';
        }
        grid[y1][x1] = '┌';
        grid[y1][x2] = '┐';
        grid[y2][x1] = '└';
        grid[y2][x2] = '┘';
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(io::stdout(), terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    io::stdout().flush()
}

/// Next pending key press, without blocking.
pub fn poll_key() -> io::Result<Option<KeyCode>> {
    if event::poll(std::time::Duration::from_millis(0))? {
        if let Event::Key(KeyEvent { code, kind: KeyEventKind::Press, .. }) = event::read()? {
            return Ok(Some(code));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn black(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(w, h, Rgb([0, 0, 0])))
    }

    #[test]
    fn renders_grid_of_requested_size() {
        let renderer = AsciiRenderer::new(Some(20), Some(10));
        let out = renderer.render(&black(64, 48), None, "");
        let lines: Vec<_> = out.split("\r\n").collect();
        assert_eq!(lines.len(), 10);
        assert!(lines.iter().all(|l| l.chars().count() == 20));
    }

    #[test]
    fn face_box_corners_land_on_percent_cells() {
        let renderer = AsciiRenderer::new(Some(20), Some(10));
        let face = FaceRect { left: 25.0, top: 20.0, width: 50.0, height: 50.0 };
        let out = renderer.render(&black(64, 48), Some(&face), "Verifying...");
        let grid: Vec<Vec<char>> = out.split("\r\n").map(|l| l.chars().collect()).collect();

        assert_eq!(grid[2][5], '┌');
        assert_eq!(grid[2][15], '┐');
        assert_eq!(grid[7][5], '└');
        assert_eq!(grid[7][15], '┘');
        assert!(out.contains("Verifying..."));
    }

    #[test]
    fn status_without_face_is_centred() {
        let renderer = AsciiRenderer::new(Some(30), Some(9));
        let out = renderer.render(&black(64, 48), None, "Position your face in frame");
        let middle = out.split("\r\n").nth(4).unwrap();
        assert!(middle.contains("Position your face in frame"));
    }
}
