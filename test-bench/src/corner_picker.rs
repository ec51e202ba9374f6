//! Terminal corner pickers for the compensation fallback.
//!
//! [`FixedCorners`] replays corners given on the command line, handy when the
//! same rig is calibrated repeatedly. [`PromptCornerPicker`] prints a coarse
//! preview of the brightness map and asks for the four corners one by one.

use std::fmt::Write as _;
use std::str::FromStr;

use lcdmap_shared::image_proc::Corner;
use lcdmap_shared::CornerPicker;
use ndarray::ArrayView2;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::warn;

/// Brightness ramp of the ASCII preview, darkest first.
const SHADES: &[u8] = b".:-=+*#%@";

/// Parse one `x,y` corner.
pub fn parse_corner(s: &str) -> Result<Corner, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("'{s}' is not an x,y pair"))?;
    let x = x
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("Invalid x coordinate '{}'", x.trim()))?;
    let y = y
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("Invalid y coordinate '{}'", y.trim()))?;
    Ok(Corner::new(x, y))
}

/// Four corners known in advance, written `x,y;x,y;x,y;x,y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedCorners(pub [Corner; 4]);

impl FromStr for FixedCorners {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let corners = s
            .split(';')
            .filter(|part| !part.trim().is_empty())
            .map(parse_corner)
            .collect::<Result<Vec<_>, _>>()?;
        let count = corners.len();
        <[Corner; 4]>::try_from(corners)
            .map(FixedCorners)
            .map_err(|_| format!("expected 4 corners, got {count}"))
    }
}

impl CornerPicker for FixedCorners {
    fn pick_corners(&mut self, _grid: &ArrayView2<f64>) -> Option<[Corner; 4]> {
        Some(self.0)
    }
}

/// Render `grid` as text, one character per cell.
///
/// Rows are labelled with their index and a header marks every tenth column.
/// Missing cells are blank.
pub fn ascii_preview(grid: &ArrayView2<f64>) -> String {
    let (lo, hi) = grid
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;

    let mut out = String::new();
    let header: String = (0..grid.ncols())
        .map(|x| if x % 10 == 0 { char::from(b'0' + ((x / 10) % 10) as u8) } else { ' ' })
        .collect();
    let _ = writeln!(out, "     {}", header.trim_end());

    for (y, row) in grid.rows().into_iter().enumerate() {
        let line: String = row
            .iter()
            .map(|&v| {
                if !v.is_finite() {
                    ' '
                } else if span > 0.0 {
                    let level = ((v - lo) / span * (SHADES.len() - 1) as f64).round() as usize;
                    char::from(SHADES[level.min(SHADES.len() - 1)])
                } else {
                    char::from(SHADES[SHADES.len() - 1])
                }
            })
            .collect();
        let _ = writeln!(out, "{y:4} {line}");
    }
    out
}

/// Asks for the corners on the terminal.
pub struct PromptCornerPicker {
    editor: DefaultEditor,
}

impl PromptCornerPicker {
    pub fn new() -> rustyline::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }

    /// Read one corner, `None` when the user gives up.
    fn prompt_corner(&mut self, index: usize) -> Option<Corner> {
        loop {
            match self.editor.readline(&format!("corner {} of 4 (x,y): ", index + 1)) {
                Ok(line) if line.trim().is_empty() => return None,
                Ok(line) => match parse_corner(&line) {
                    Ok(corner) => return Some(corner),
                    Err(e) => println!("{e}"),
                },
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return None,
                Err(e) => {
                    warn!("Failed to read corner: {e}");
                    return None;
                }
            }
        }
    }
}

impl CornerPicker for PromptCornerPicker {
    fn pick_corners(&mut self, grid: &ArrayView2<f64>) -> Option<[Corner; 4]> {
        println!("{}", ascii_preview(grid));
        println!(
            "Locate the screen: enter its four corners as column,row (grid is {}x{}), empty line cancels",
            grid.ncols(),
            grid.nrows()
        );

        let mut corners = [Corner::new(0, 0); 4];
        for (i, corner) in corners.iter_mut().enumerate() {
            *corner = self.prompt_corner(i)?;
        }
        Some(corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_corner() {
        assert_eq!(parse_corner("3,4").unwrap(), Corner::new(3, 4));
        assert_eq!(parse_corner(" 12 , -1 ").unwrap(), Corner::new(12, -1));
        assert!(parse_corner("3").is_err());
        assert!(parse_corner("3,y").is_err());
        assert!(parse_corner("1.5,2").is_err());
    }

    #[test]
    fn test_fixed_corners_from_str() {
        let fixed: FixedCorners = "0,0; 30,0; 0,20; 30,20".parse().unwrap();
        assert_eq!(
            fixed.0,
            [
                Corner::new(0, 0),
                Corner::new(30, 0),
                Corner::new(0, 20),
                Corner::new(30, 20),
            ]
        );
        // A trailing separator is tolerated
        assert!("0,0;1,0;0,1;1,1;".parse::<FixedCorners>().is_ok());
    }

    #[test]
    fn test_fixed_corners_needs_four() {
        let err = "0,0;1,1;2,2".parse::<FixedCorners>().unwrap_err();
        assert!(err.contains("got 3"), "{err}");
        assert!("0,0;1,1;2,2;3,3;4,4".parse::<FixedCorners>().is_err());
        assert!("".parse::<FixedCorners>().is_err());
    }

    #[test]
    fn test_fixed_corners_picks_without_looking() {
        let mut fixed: FixedCorners = "1,1;5,1;1,4;5,4".parse().unwrap();
        let grid = ndarray::Array2::<f64>::zeros((2, 2));
        assert_eq!(fixed.pick_corners(&grid.view()), Some(fixed.0));
    }

    #[test]
    fn test_ascii_preview_shades_and_gaps() {
        let grid = array![[0.0, 50.0, 100.0], [f64::NAN, 100.0, 0.0]];
        let preview = ascii_preview(&grid.view());
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "     0");
        assert_eq!(lines[1], "   0 .+@");
        assert_eq!(lines[2], "   1  @.");
    }

    #[test]
    fn test_ascii_preview_flat_grid() {
        let grid = ndarray::Array2::from_elem((1, 2), 7.0);
        assert_eq!(ascii_preview(&grid.view()).lines().nth(1), Some("   0 @@"));
    }
}
