// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to handle datasets using the Middlebury stereo
//! `calib.txt` format:
//!
//! ```text
//! cam0=[3997.684 0 1176.728; 0 3997.684 1011.728; 0 0 1]
//! cam1=[3997.684 0 1307.839; 0 3997.684 1011.728; 0 0 1]
//! doffs=131.111
//! baseline=193.001
//! width=2964
//! height=1988
//! ndisp=280
//! ```

use crate::core::camera::Intrinsics;
use crate::misc::type_aliases::Float;

/// Calibration of a Middlebury stereo pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Calib {
    /// Intrinsics of the left camera.
    pub cam0: Intrinsics,
    /// Intrinsics of the right camera.
    pub cam1: Intrinsics,
    /// x difference of principal points, `cx1 - cx0`.
    pub doffs: Float,
    /// Camera baseline in mm.
    pub baseline: Float,
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Conservative bound on the number of disparity levels.
    pub ndisp: usize,
    /// Whether the ground truth disparities are integer valued.
    pub isint: bool,
    /// Tight bound on minimum disparity, 0 if absent from the file.
    pub vmin: usize,
    /// Tight bound on maximum disparity, 0 if absent from the file.
    pub vmax: usize,
    /// Average absolute y disparity of the ground truth, 0 if absent.
    pub dyavg: Float,
    /// Maximum absolute y disparity of the ground truth, 0 if absent.
    pub dymax: Float,
}

/// Parse calibration files in the Middlebury `calib.txt` format.
pub mod parse {
    use super::*;
    use nom::{alt, do_parse, float, is_not, map, named, space, tag, types::CompleteStr};

    /// Parse the content of a `calib.txt` file into a `Calib`.
    /// Unknown keys are ignored.
    pub fn calib(file_content: &str) -> Result<Calib, String> {
        let mut builder = CalibBuilder::default();
        for line in file_content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match calib_line(CompleteStr(line)) {
                Ok((_, entry)) => builder.insert(entry),
                Err(_) => return Err(format!("Parsing error: {}", line)),
            }
        }
        builder.build()
    }

    // Calibration entries are folded into the builder, which checks
    // at the end that every required key showed up.
    #[derive(Default)]
    struct CalibBuilder {
        cam0: Option<Intrinsics>,
        cam1: Option<Intrinsics>,
        doffs: Option<Float>,
        baseline: Option<Float>,
        width: Option<usize>,
        height: Option<usize>,
        ndisp: Option<usize>,
        isint: Option<bool>,
        vmin: Option<usize>,
        vmax: Option<usize>,
        dyavg: Option<Float>,
        dymax: Option<Float>,
    }

    impl CalibBuilder {
        fn insert(&mut self, entry: Entry) {
            match entry {
                Entry::Cam0(intrinsics) => self.cam0 = Some(intrinsics),
                Entry::Cam1(intrinsics) => self.cam1 = Some(intrinsics),
                Entry::Scalar(key, value) => match key.as_str() {
                    "doffs" => self.doffs = Some(value),
                    "baseline" => self.baseline = Some(value),
                    "width" => self.width = Some(value as usize),
                    "height" => self.height = Some(value as usize),
                    "ndisp" => self.ndisp = Some(value as usize),
                    "isint" => self.isint = Some(value != 0.0),
                    "vmin" => self.vmin = Some(value as usize),
                    "vmax" => self.vmax = Some(value as usize),
                    "dyavg" => self.dyavg = Some(value),
                    "dymax" => self.dymax = Some(value),
                    _ => (),
                },
            }
        }

        fn build(self) -> Result<Calib, String> {
            Ok(Calib {
                cam0: self.cam0.ok_or("Missing key: cam0")?,
                cam1: self.cam1.ok_or("Missing key: cam1")?,
                doffs: self.doffs.ok_or("Missing key: doffs")?,
                baseline: self.baseline.ok_or("Missing key: baseline")?,
                width: self.width.ok_or("Missing key: width")?,
                height: self.height.ok_or("Missing key: height")?,
                ndisp: self.ndisp.ok_or("Missing key: ndisp")?,
                isint: self.isint.unwrap_or(false),
                vmin: self.vmin.unwrap_or(0),
                vmax: self.vmax.unwrap_or(0),
                dyavg: self.dyavg.unwrap_or(0.0),
                dymax: self.dymax.unwrap_or(0.0),
            })
        }
    }

    enum Entry {
        Cam0(Intrinsics),
        Cam1(Intrinsics),
        Scalar(String, Float),
    }

    // nom parsers #############################################################

    // A calibration line is a camera matrix or a scalar key=value pair.
    named!(calib_line<CompleteStr, Entry>,
        alt!( cam0 | cam1 | scalar )
    );

    named!(cam0<CompleteStr, Entry>,
        do_parse!( tag!("cam0=") >> k: camera_matrix >> (Entry::Cam0(k)) )
    );

    named!(cam1<CompleteStr, Entry>,
        do_parse!( tag!("cam1=") >> k: camera_matrix >> (Entry::Cam1(k)) )
    );

    // Parse a `[f 0 cx; 0 f cy; 0 0 1]` camera matrix.
    // The off diagonal and bottom row entries are discarded.
    named!(camera_matrix<CompleteStr, Intrinsics>,
        do_parse!(
            tag!("[") >>
            fx: float >> space >> float >> space >> cx: float >>
            tag!(";") >> space >>
            float >> space >> fy: float >> space >> cy: float >>
            tag!(";") >> space >>
            float >> space >> float >> space >> float >>
            tag!("]") >>
            (Intrinsics { focal: (fx, fy), principal_point: (cx, cy) })
        )
    );

    // Parse a scalar `key=value` entry.
    named!(scalar<CompleteStr, Entry>,
        do_parse!(
            key: is_not!("=") >> tag!("=") >> value: float >>
            (Entry::Scalar((*key).to_string(), value))
        )
    );
} // pub mod parse

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    const CALIB_FILE: &str = "\
cam0=[3997.684 0 1176.728; 0 3997.684 1011.728; 0 0 1]
cam1=[3997.684 0 1307.839; 0 3997.684 1011.728; 0 0 1]
doffs=131.111
baseline=193.001
width=2964
height=1988
ndisp=280
isint=0
vmin=31
vmax=257
dyavg=0.918
dymax=1.516
";

    #[test]
    fn full_calib_file_is_parsed() {
        let calib = parse::calib(CALIB_FILE).unwrap();
        assert_eq!((3997.684, 3997.684), calib.cam0.focal);
        assert_eq!((1176.728, 1011.728), calib.cam0.principal_point);
        assert_eq!((1307.839, 1011.728), calib.cam1.principal_point);
        assert_eq!(131.111, calib.doffs);
        assert_eq!(193.001, calib.baseline);
        assert_eq!(2964, calib.width);
        assert_eq!(1988, calib.height);
        assert_eq!(280, calib.ndisp);
        assert!(!calib.isint);
        assert_eq!(31, calib.vmin);
        assert_eq!(257, calib.vmax);
        assert_eq!(0.918, calib.dyavg);
        assert_eq!(1.516, calib.dymax);
    }

    #[test]
    fn disparity_bounds_are_optional() {
        let truncated: String = CALIB_FILE.lines().take(7).collect::<Vec<_>>().join("\n");
        let calib = parse::calib(&truncated).unwrap();
        assert_eq!(0, calib.vmin);
        assert_eq!(0, calib.vmax);
    }

    #[test]
    fn missing_camera_is_an_error() {
        let truncated: String = CALIB_FILE.lines().skip(1).collect::<Vec<_>>().join("\n");
        assert!(parse::calib(&truncated).is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse::calib("cam0=[oops]").is_err());
    }
}
