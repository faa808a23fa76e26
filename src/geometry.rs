//! Page geometry: how a frame is scaled and where it lands on its page.
//!
//! All sizes are in PDF user-space units (points). A frame of `w`x`h` pixels
//! is `w`x`h` points wide unless DPI scaling is requested, in which case it is
//! first brought to 72 DPI.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// PDF user space has 72 units per inch.
pub const PDF_DPI: f32 = 72.0;

/// Width and height of a rectangle anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutBox {
    pub width: f32,
    pub height: f32,
}

impl LayoutBox {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Same box turned by 90 degrees.
    pub fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Parse a `--scale` value: either `WxH` in points or a page size name.
    pub fn parse_dimension(value: &str) -> Result<Self> {
        match value.find('x') {
            Some(pos) if pos > 0 => {
                let width = value[..pos].parse::<u32>();
                let height = value[pos + 1..].parse::<u32>();
                match (width, height) {
                    (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok(Self::new(w as f32, h as f32)),
                    _ => Err(Error::InvalidScaleBox(value.to_string())),
                }
            }
            _ => page_size(value).ok_or_else(|| Error::InvalidScaleBox(value.to_string())),
        }
    }
}

impl fmt::Display for LayoutBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x{:.2}", self.width, self.height)
    }
}

/// Portrait page sizes in points, by name.
const PAGE_SIZES: &[(&str, f32, f32)] = &[
    ("A0", 2384.0, 3370.0),
    ("A1", 1684.0, 2384.0),
    ("A2", 1191.0, 1684.0),
    ("A3", 842.0, 1191.0),
    ("A4", 595.0, 842.0),
    ("A5", 420.0, 595.0),
    ("A6", 297.0, 420.0),
    ("A7", 210.0, 297.0),
    ("A8", 148.0, 210.0),
    ("A9", 105.0, 148.0),
    ("A10", 74.0, 105.0),
    ("B0", 2834.0, 4008.0),
    ("B1", 2004.0, 2834.0),
    ("B2", 1417.0, 2004.0),
    ("B3", 1000.0, 1417.0),
    ("B4", 708.0, 1000.0),
    ("B5", 498.0, 708.0),
    ("B6", 354.0, 498.0),
    ("B7", 249.0, 354.0),
    ("B8", 175.0, 249.0),
    ("B9", 124.0, 175.0),
    ("B10", 87.0, 124.0),
    ("LETTER", 612.0, 792.0),
    ("HALFLETTER", 396.0, 612.0),
    ("LEGAL", 612.0, 1008.0),
    ("TABLOID", 792.0, 1224.0),
    ("LEDGER", 1224.0, 792.0),
    ("EXECUTIVE", 522.0, 756.0),
];

/// Look up a standard page size, ignoring case.
pub fn page_size(name: &str) -> Option<LayoutBox> {
    PAGE_SIZES
        .iter()
        .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, w, h)| LayoutBox::new(w, h))
}

/// Where an image is anchored on its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gravity {
    #[default]
    Center,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
    TopLeft,
}

/// Canonical name and alias of every gravity.
const GRAVITY_NAMES: &[(Gravity, &str, &str)] = &[
    (Gravity::Center, "center", "centre"),
    (Gravity::Top, "top", "north"),
    (Gravity::TopRight, "topRight", "northEast"),
    (Gravity::Right, "right", "east"),
    (Gravity::BottomRight, "bottomRight", "southEast"),
    (Gravity::Bottom, "bottom", "south"),
    (Gravity::BottomLeft, "bottomLeft", "southWest"),
    (Gravity::Left, "left", "west"),
    (Gravity::TopLeft, "topLeft", "northWest"),
];

/// Placement of one axis.
enum Align {
    Start,
    Middle,
    End,
}

impl Gravity {
    pub fn name(self) -> &'static str {
        GRAVITY_NAMES
            .iter()
            .find(|(g, _, _)| *g == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("center")
    }

    fn alignment(self) -> (Align, Align) {
        match self {
            Gravity::Center => (Align::Middle, Align::Middle),
            Gravity::Top => (Align::Middle, Align::End),
            Gravity::TopRight => (Align::End, Align::End),
            Gravity::Right => (Align::End, Align::Middle),
            Gravity::BottomRight => (Align::End, Align::Start),
            Gravity::Bottom => (Align::Middle, Align::Start),
            Gravity::BottomLeft => (Align::Start, Align::Start),
            Gravity::Left => (Align::Start, Align::Middle),
            Gravity::TopLeft => (Align::Start, Align::End),
        }
    }

    /// Origin of an image of `size` on `page`, keeping `border` off the edges.
    pub fn place(self, page: LayoutBox, size: LayoutBox, border: f32) -> (f32, f32) {
        let (horizontal, vertical) = self.alignment();
        (
            align(horizontal, page.width, size.width, border),
            align(vertical, page.height, size.height, border),
        )
    }
}

fn align(alignment: Align, extent: f32, size: f32, border: f32) -> f32 {
    match alignment {
        Align::Start => border,
        Align::Middle => (extent - size) / 2.0 + border,
        Align::End => extent - size - border,
    }
}

impl FromStr for Gravity {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        GRAVITY_NAMES
            .iter()
            .find(|(_, name, alias)| {
                name.eq_ignore_ascii_case(value) || alias.eq_ignore_ascii_case(value)
            })
            .map(|(g, _, _)| *g)
            .ok_or_else(|| Error::UnknownGravity(value.to_string()))
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Layout settings shared by every frame of a merge.
#[derive(Debug, Clone, Default)]
pub struct LayoutOptions {
    /// Bring frames with known DPI to 72 DPI before fitting
    pub scale_to_dpi: bool,
    /// Shrink frames to fit this box (page size is still the frame's own)
    pub scale_box: Option<LayoutBox>,
    /// Place frames on pages of this size, shrinking them if necessary
    pub page: Option<LayoutBox>,
    /// Inset kept free on every side
    pub border: f32,
    /// Anchor on the page, only used together with `page`
    pub gravity: Gravity,
}

/// How one frame ends up on its page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePlan {
    /// Rendered image size
    pub size: LayoutBox,
    /// Lower-left corner of the image on the page
    pub origin: (f32, f32),
    /// Physical page size
    pub page: LayoutBox,
}

/// Plan the scale and placement of a frame of `natural` size.
///
/// `dpi` is the frame's horizontal and vertical resolution; values not above
/// zero mean the resolution is unknown.
pub fn plan(natural: LayoutBox, dpi: (f32, f32), options: &LayoutOptions) -> Result<ScalePlan> {
    let border = options.border;
    let mut size = natural;

    let (dpi_x, dpi_y) = dpi;
    if options.scale_to_dpi
        && dpi_x > 0.0
        && dpi_y > 0.0
        && (dpi_x != PDF_DPI || dpi_y != PDF_DPI)
    {
        size = LayoutBox::new(size.width * PDF_DPI / dpi_x, size.height * PDF_DPI / dpi_y);
        log::debug!(
            "Scaled image as to {}x{} DPI {} -> {}",
            dpi_x,
            dpi_y,
            natural,
            size
        );
    }

    if let Some(scale_box) = options.scale_box {
        size = fit_to_box(size, scale_box, border)?.0;
    }

    if let Some(page) = options.page {
        let (size, page) = fit_to_box(size, page, border)?;
        let origin = options.gravity.place(page, size, border);
        return Ok(ScalePlan { size, origin, page });
    }

    Ok(ScalePlan {
        size,
        origin: (border, border),
        page: LayoutBox::new(size.width + border * 2.0, size.height + border * 2.0),
    })
}

/// Shrink `size` into `target` less the border, turning the target by 90
/// degrees first when that lets a landscape frame fit as it is.
///
/// Returns the new size and the (possibly rotated) target.
pub fn fit_to_box(size: LayoutBox, target: LayoutBox, border: f32) -> Result<(LayoutBox, LayoutBox)> {
    let mut target = target;
    if target.width <= border * 2.0 || target.height <= border * 2.0 {
        return Err(Error::BorderTooLarge {
            border,
            width: target.width,
            height: target.height,
        });
    }

    if fits(size, target, border) {
        return Ok((size, target));
    }

    if size.width > size.height {
        target = target.rotated();
        if fits(size, target, border) {
            return Ok((size, target));
        }
    }

    Ok((scale_to_fit(size, target, border), target))
}

fn fits(size: LayoutBox, target: LayoutBox, border: f32) -> bool {
    size.width <= target.width - border * 2.0 && size.height <= target.height - border * 2.0
}

/// Proportional shrink so that `size` fits `target` less the border.
fn scale_to_fit(size: LayoutBox, target: LayoutBox, border: f32) -> LayoutBox {
    let available_width = target.width - border * 2.0;
    let available_height = target.height - border * 2.0;
    let factor = (available_width / size.width)
        .min(available_height / size.height)
        .min(1.0);
    LayoutBox::new(
        (size.width * factor).min(available_width),
        (size.height * factor).min(available_height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn page_options(page: LayoutBox, border: f32, gravity: Gravity) -> LayoutOptions {
        LayoutOptions {
            page: Some(page),
            border,
            gravity,
            ..Default::default()
        }
    }

    #[test]
    fn test_page_size_lookup() {
        assert_eq!(page_size("A4"), Some(LayoutBox::new(595.0, 842.0)));
        assert_eq!(page_size("a5"), Some(LayoutBox::new(420.0, 595.0)));
        assert_eq!(page_size("letter"), Some(LayoutBox::new(612.0, 792.0)));
        assert_eq!(page_size("A!"), None);
        assert_eq!(page_size("ZZ"), None);
    }

    #[test]
    fn test_parse_dimension() {
        assert_eq!(
            LayoutBox::parse_dimension("100x200").unwrap(),
            LayoutBox::new(100.0, 200.0)
        );
        assert_eq!(
            LayoutBox::parse_dimension("A5").unwrap(),
            LayoutBox::new(420.0, 595.0)
        );
        for bad in ["x10", "10x", "AxB", "ZZ", "0x10", "-5x10"] {
            assert!(
                matches!(LayoutBox::parse_dimension(bad), Err(Error::InvalidScaleBox(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_gravity_names_and_aliases() {
        assert_eq!("center".parse::<Gravity>().unwrap(), Gravity::Center);
        assert_eq!("Centre".parse::<Gravity>().unwrap(), Gravity::Center);
        assert_eq!("north".parse::<Gravity>().unwrap(), Gravity::Top);
        assert_eq!("northEast".parse::<Gravity>().unwrap(), Gravity::TopRight);
        assert_eq!("RIGHT".parse::<Gravity>().unwrap(), Gravity::Right);
        assert_eq!("SouthEast".parse::<Gravity>().unwrap(), Gravity::BottomRight);
        assert_eq!("sOUth".parse::<Gravity>().unwrap(), Gravity::Bottom);
        assert_eq!("bottomLEFT".parse::<Gravity>().unwrap(), Gravity::BottomLeft);
        assert_eq!("west".parse::<Gravity>().unwrap(), Gravity::Left);
        assert_eq!("NORTHwest".parse::<Gravity>().unwrap(), Gravity::TopLeft);
        assert!("south_west".parse::<Gravity>().is_err());
        assert!("unknown".parse::<Gravity>().is_err());
        assert_eq!(Gravity::default(), Gravity::Center);
    }

    #[test]
    fn test_gravity_placement() {
        let page = LayoutBox::new(200.0, 300.0);
        let image = LayoutBox::new(50.0, 50.0);

        assert_eq!(Gravity::TopRight.place(page, image, 10.0), (140.0, 240.0));
        assert_eq!(Gravity::BottomLeft.place(page, image, 10.0), (10.0, 10.0));
        assert_eq!(Gravity::Center.place(page, image, 10.0), (85.0, 135.0));
        assert_eq!(Gravity::TopLeft.place(page, image, 10.0), (10.0, 240.0));
        assert_eq!(Gravity::BottomRight.place(page, image, 10.0), (140.0, 10.0));
        assert_eq!(Gravity::Top.place(page, image, 10.0), (85.0, 240.0));
        assert_eq!(Gravity::Bottom.place(page, image, 10.0), (85.0, 10.0));
        assert_eq!(Gravity::Left.place(page, image, 10.0), (10.0, 135.0));
        assert_eq!(Gravity::Right.place(page, image, 10.0), (140.0, 135.0));
    }

    #[test]
    fn test_plan_without_target_uses_frame_as_page() {
        let options = LayoutOptions {
            border: 20.0,
            ..Default::default()
        };
        let plan = plan(LayoutBox::new(300.0, 100.0), (0.0, 0.0), &options).unwrap();
        assert_eq!(plan.size, LayoutBox::new(300.0, 100.0));
        assert_eq!(plan.origin, (20.0, 20.0));
        assert_eq!(plan.page, LayoutBox::new(340.0, 140.0));
    }

    #[test]
    fn test_plan_dpi_scaling() {
        let options = LayoutOptions {
            scale_to_dpi: true,
            ..Default::default()
        };
        let plan = plan(LayoutBox::new(288.0, 144.0), (144.0, 144.0), &options).unwrap();
        assert_eq!(plan.size, LayoutBox::new(144.0, 72.0));

        // Unknown DPI leaves the frame alone
        let plan = super::plan(LayoutBox::new(288.0, 144.0), (-1.0, 144.0), &options).unwrap();
        assert_eq!(plan.size, LayoutBox::new(288.0, 144.0));

        // DPI is ignored unless asked for
        let plan = super::plan(
            LayoutBox::new(288.0, 144.0),
            (144.0, 144.0),
            &LayoutOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.size, LayoutBox::new(288.0, 144.0));
    }

    #[test]
    fn test_rotation_fallback_without_shrink() {
        let (size, target) =
            fit_to_box(LayoutBox::new(400.0, 100.0), LayoutBox::new(120.0, 300.0), 0.0).unwrap();
        assert_eq!(target, LayoutBox::new(300.0, 120.0));
        // still too wide for the rotated box, so it is shrunk to 300 wide
        assert_eq!(size, LayoutBox::new(300.0, 75.0));

        let (size, target) =
            fit_to_box(LayoutBox::new(280.0, 100.0), LayoutBox::new(120.0, 300.0), 0.0).unwrap();
        assert_eq!(target, LayoutBox::new(300.0, 120.0));
        assert_eq!(size, LayoutBox::new(280.0, 100.0));
    }

    #[test]
    fn test_portrait_frame_is_not_rotated() {
        let (size, target) =
            fit_to_box(LayoutBox::new(100.0, 600.0), LayoutBox::new(300.0, 200.0), 0.0).unwrap();
        assert_eq!(target, LayoutBox::new(300.0, 200.0));
        assert!((size.width - 33.333_332).abs() < 0.001);
        assert_eq!(size.height, 200.0);
    }

    #[test]
    fn test_page_target_rotates_page() {
        let a5 = page_size("A5").unwrap();
        let plan = plan(
            LayoutBox::new(595.0, 10.0),
            (72.0, 72.0),
            &page_options(a5, 0.0, Gravity::Center),
        )
        .unwrap();
        assert_eq!(plan.page, a5.rotated());
        assert_eq!(plan.size, LayoutBox::new(595.0, 10.0));
        assert_eq!(plan.origin, (0.0, 205.0));
    }

    #[test]
    fn test_scale_box_then_page() {
        let options = LayoutOptions {
            scale_box: Some(LayoutBox::new(100.0, 100.0)),
            page: page_size("A5"),
            ..Default::default()
        };
        let plan = plan(LayoutBox::new(200.0, 400.0), (0.0, 0.0), &options).unwrap();
        assert_eq!(plan.size, LayoutBox::new(50.0, 100.0));
        assert_eq!(plan.page, LayoutBox::new(420.0, 595.0));
    }

    #[test]
    fn test_border_too_large() {
        let result = fit_to_box(LayoutBox::new(10.0, 10.0), LayoutBox::new(100.0, 40.0), 20.0);
        assert!(matches!(result, Err(Error::BorderTooLarge { .. })));
    }

    proptest! {
        #[test]
        fn prop_fit_stays_inside_box_and_never_grows(
            w in 1.0f32..5000.0,
            h in 1.0f32..5000.0,
            bw in 50.0f32..3000.0,
            bh in 50.0f32..3000.0,
            border in 0u32..20,
        ) {
            let border = border as f32;
            let (size, target) =
                fit_to_box(LayoutBox::new(w, h), LayoutBox::new(bw, bh), border).unwrap();
            prop_assert!(size.width <= target.width - 2.0 * border + 0.01);
            prop_assert!(size.height <= target.height - 2.0 * border + 0.01);
            prop_assert!(size.width <= w + 0.01);
            prop_assert!(size.height <= h + 0.01);
            // aspect ratio survives the shrink
            prop_assert!(((size.width / size.height) - (w / h)).abs() <= 0.01 * (w / h).max(1.0));
        }

        #[test]
        fn prop_rotation_only_for_landscape(
            w in 1.0f32..2000.0,
            h in 1.0f32..2000.0,
        ) {
            let target = LayoutBox::new(100.0, 100.0 + 1.0);
            let (_, chosen) = fit_to_box(LayoutBox::new(w, h), target, 0.0).unwrap();
            if chosen != target {
                prop_assert!(w > h);
            }
        }
    }
}
