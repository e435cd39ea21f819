// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

extern crate env_logger;
extern crate image;
extern crate stereo_depth_rs as sdr;

use std::{env, error::Error, fs, path::Path, path::PathBuf};

use sdr::core::camera::{Camera, Extrinsics};
use sdr::core::{matching, pose, rectification, refinement, remap};
use sdr::dataset::{matches, middlebury};
use sdr::misc::type_aliases::RgbMatrix;
use sdr::misc::{interop, view};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if let Err(error) = my_run(&args) {
        eprintln!("{:?}", error);
        std::process::exit(1);
    }
}

const USAGE: &str =
    "Usage: ./sdr_depth [sad|ncc] calib_file matches_file left_image right_image out_dir";

fn my_run(args: &[String]) -> Result<(), Box<dyn Error>> {
    // Check that the arguments are correct.
    let valid_args = check_args(args)?;

    // Read the calibration and keypoint match files.
    let calib = middlebury::parse::calib(&fs::read_to_string(&valid_args.calib_file_path)?)?;
    let keypoint_matches =
        matches::parse::matches(&fs::read_to_string(&valid_args.matches_file_path)?)?;

    // Read the stereo pair.
    let left_image = read_image(&valid_args.left_image_path)?;
    let right_image = read_image(&valid_args.right_image_path)?;

    // Recover the relative pose of the right camera from the matches.
    let relative_pose = pose::estimate(
        &keypoint_matches,
        &calib.cam0,
        &pose::Config::default(),
    )?;

    // Rectify the pair onto a common epipolar grid.
    let left_camera = Camera::new(calib.cam0.clone(), Extrinsics::identity());
    let right_camera = Camera::new(calib.cam1.clone(), relative_pose.clone());
    let rectified = rectification::rectify(
        &left_image,
        &right_image,
        &left_camera,
        &right_camera,
        &relative_pose,
    )?;

    // Dense block matching on the gray rectified pair.
    let matching_config = matching::Config {
        window_radius: 5,
        max_disparity: calib.ndisp,
    };
    let left_gray = interop::gray_from_rgb_matrix(&rectified.left);
    let right_gray = interop::gray_from_rgb_matrix(&rectified.right);
    let disparities = match valid_args.matcher {
        Matcher::Sad => matching::sad(&left_gray, &right_gray, &matching_config)?,
        Matcher::Ncc => matching::ncc(&left_gray, &right_gray, &matching_config)?,
    };

    // Global refinement of the raw disparity field.
    let n_labels = if calib.ndisp == 0 {
        calib.width
    } else {
        calib.ndisp
    };
    let refined = refinement::refine(&disparities, n_labels, &refinement::Config::default());

    // Map the disparities back into the original left pixel grid
    // and normalize for display.
    let (rows, cols) = left_image.shape();
    let field = remap::map_back(
        &rectified.correspondences,
        rows,
        cols,
        &remap::to_float_field(&refined),
    );
    let display = remap::normalize_for_display(&field, 0.3);

    // Save the outputs.
    fs::create_dir_all(&valid_args.out_dir)?;
    save_rgb(&rectified.left, &valid_args.out_dir.join("rectified_left.png"))?;
    save_rgb(&rectified.right, &valid_args.out_dir.join("rectified_right.png"))?;
    view::field_image(&display).save(&valid_args.out_dir.join("disparity.png"))?;

    // With a calibrated baseline, also save a metric depth visualization.
    if calib.baseline > 0.0 {
        let depth = remap::disparity_to_depth(&field, calib.cam0.focal.0, calib.baseline);
        let depth_display = remap::normalize_for_display(&depth, 0.3);
        view::field_image(&depth_display).save(&valid_args.out_dir.join("depth.png"))?;
    }
    println!("Saved disparity map in {}", valid_args.out_dir.display());

    Ok(())
}

enum Matcher {
    Sad,
    Ncc,
}

struct Args {
    matcher: Matcher,
    calib_file_path: PathBuf,
    matches_file_path: PathBuf,
    left_image_path: PathBuf,
    right_image_path: PathBuf,
    out_dir: PathBuf,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args, String> {
    if let [_, matcher_id, calib, matches_file, left, right, out_dir] = args {
        let matcher = match matcher_id.as_str() {
            "sad" => Matcher::Sad,
            "ncc" => Matcher::Ncc,
            _ => {
                eprintln!("{}", USAGE);
                return Err(format!("Unknown matcher: {}", matcher_id));
            }
        };
        let existing_file = |path_str: &String| {
            let path = PathBuf::from(path_str);
            if path.is_file() {
                Ok(path)
            } else {
                eprintln!("{}", USAGE);
                Err(format!(
                    "The file does not exist or is not reachable: {}",
                    path_str
                ))
            }
        };
        Ok(Args {
            matcher,
            calib_file_path: existing_file(calib)?,
            matches_file_path: existing_file(matches_file)?,
            left_image_path: existing_file(left)?,
            right_image_path: existing_file(right)?,
            out_dir: PathBuf::from(out_dir),
        })
    } else {
        eprintln!("{}", USAGE);
        Err("Wrong number of arguments".to_string())
    }
}

/// Read an image file into an RGB matrix.
fn read_image<P: AsRef<Path>>(file_path: P) -> Result<RgbMatrix, Box<dyn Error>> {
    let img = image::open(file_path)?.to_rgb();
    Ok(interop::matrix_from_rgb_image(img))
}

/// Save an RGB matrix as a png file.
fn save_rgb(mat: &RgbMatrix, file_path: &Path) -> Result<(), Box<dyn Error>> {
    interop::rgb_from_matrix(mat).save(file_path)?;
    Ok(())
}
