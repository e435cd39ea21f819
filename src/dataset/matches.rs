// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to read sparse keypoint match files.
//!
//! One match per line, `x1 y1 x2 y2` in pixels, left image first.
//! Lines starting with `#` are comments.

use crate::misc::type_aliases::Point2;

/// A pair of matched pixel positions, left image first.
pub type Match = (Point2, Point2);

/// Parse keypoint match files.
pub mod parse {
    use super::*;
    use nom::{alt, anychar, do_parse, float, many0, map, named, space, tag, types::CompleteStr};

    /// Parse the content of a match file into a vector of `Match`.
    pub fn matches(file_content: &str) -> Result<Vec<Match>, String> {
        let mut vec_matches = Vec::new();
        for line in file_content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match match_line(CompleteStr(line)) {
                Ok((_, Some(keypoint_match))) => vec_matches.push(keypoint_match),
                Ok(_) => (),
                Err(_) => return Err(format!("Parsing error: {}", line)),
            }
        }
        Ok(vec_matches)
    }

    // nom parsers #############################################################

    // A match line is either a comment or four pixel coordinates.
    named!(match_line<CompleteStr, Option<Match> >,
        alt!( map!(comment, |_| None) | map!(keypoint_match, Some) )
    );

    // Parse a comment.
    named!(comment<CompleteStr, ()>,
        do_parse!( tag!("#") >> many0!(anychar) >> ())
    );

    // Parse one keypoint match.
    named!(keypoint_match<CompleteStr, Match>,
        do_parse!(
            x1: float >> space >>
            y1: float >> space >>
            x2: float >> space >>
            y2: float >>
            ((Point2::new(x1, y1), Point2::new(x2, y2)))
        )
    );
} // pub mod parse

// TESTS #############################################################
