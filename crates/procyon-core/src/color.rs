use ndarray::Array2;

/// Position of a pixel within the repeating 2x2 color-filter cell.
///
/// Zero-based sensor coordinates, x = column, y = row. The two green phases
/// are tracked separately: midpoint adjustment needs to know which one it
/// landed on, even though the output masks merge them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelColor {
    R,
    G1,
    G2,
    B,
}

/// Output channel of the mask builder (greens merged).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    pub fn label(&self) -> &'static str {
        match self {
            Channel::Red => "R",
            Channel::Green => "G",
            Channel::Blue => "B",
        }
    }
}

/// Color-filter label of the sensor pixel at zero-based (x, y).
pub fn pixel_color(x: i64, y: i64) -> PixelColor {
    match (x.rem_euclid(2), y.rem_euclid(2)) {
        (1, 1) => PixelColor::R,
        (0, 1) => PixelColor::G1,
        (1, 0) => PixelColor::G2,
        (0, 0) => PixelColor::B,
        _ => unreachable!(),
    }
}

/// Boolean channel masks for one array shape.
///
/// Every pixel belongs to exactly one of the three masks.
#[derive(Clone, Debug)]
pub struct ColorMasks {
    pub red: Array2<bool>,
    pub green: Array2<bool>,
    pub blue: Array2<bool>,
}

impl ColorMasks {
    pub fn shape(&self) -> (usize, usize) {
        self.red.dim()
    }

    pub fn channel(&self, channel: Channel) -> &Array2<bool> {
        match channel {
            Channel::Red => &self.red,
            Channel::Green => &self.green,
            Channel::Blue => &self.blue,
        }
    }
}

/// Build R/G/B masks for a (rows, cols) shape.
///
/// Assumes the array origin sits on even sensor parity in both axes, which
/// holds for full frames and for stamps (midpoint adjustment pins stamp
/// origins to even coordinates). Pure function of shape; callers cache per
/// distinct shape.
pub fn make_masks(shape: (usize, usize)) -> ColorMasks {
    let (rows, cols) = shape;
    let mut red = Array2::from_elem(shape, false);
    let mut green = Array2::from_elem(shape, false);
    let mut blue = Array2::from_elem(shape, false);

    for row in 0..rows {
        for col in 0..cols {
            match pixel_color(col as i64, row as i64) {
                PixelColor::R => red[[row, col]] = true,
                PixelColor::G1 | PixelColor::G2 => green[[row, col]] = true,
                PixelColor::B => blue[[row, col]] = true,
            }
        }
    }

    ColorMasks { red, green, blue }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_partition_every_pixel() {
        let masks = make_masks((6, 10));
        for row in 0..6 {
            for col in 0..10 {
                let count = [&masks.red, &masks.green, &masks.blue]
                    .iter()
                    .filter(|m| m[[row, col]])
                    .count();
                assert_eq!(count, 1, "pixel ({row}, {col}) in {count} masks");
            }
        }
    }

    #[test]
    fn green_has_two_phases() {
        let masks = make_masks((4, 4));
        let greens = masks.green.iter().filter(|&&g| g).count();
        assert_eq!(greens, 8);
        let reds = masks.red.iter().filter(|&&r| r).count();
        assert_eq!(reds, 4);
    }
}
