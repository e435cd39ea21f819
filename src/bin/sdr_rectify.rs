// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

extern crate env_logger;
extern crate image;
extern crate stereo_depth_rs as sdr;

use std::{env, error::Error, fs, path::Path, path::PathBuf};

use sdr::core::camera::{Camera, Extrinsics};
use sdr::core::{pose, rectification};
use sdr::dataset::{matches, middlebury};
use sdr::misc::interop;
use sdr::misc::type_aliases::RgbMatrix;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if let Err(error) = my_run(&args) {
        eprintln!("{:?}", error);
        std::process::exit(1);
    }
}

const USAGE: &str = "Usage: ./sdr_rectify calib_file matches_file left_image right_image out_dir";

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

    // Recover the relative pose of the right camera and rectify.
    let relative_pose = pose::estimate(
        &keypoint_matches,
        &calib.cam0,
        &pose::Config::default(),
    )?;
    let left_camera = Camera::new(calib.cam0.clone(), Extrinsics::identity());
    let right_camera = Camera::new(calib.cam1.clone(), relative_pose.clone());
    let rectified = rectification::rectify(
        &left_image,
        &right_image,
        &left_camera,
        &right_camera,
        &relative_pose,
    )?;

    // Save the rectified pair.
    fs::create_dir_all(&valid_args.out_dir)?;
    save_rgb(&rectified.left, &valid_args.out_dir.join("rectified_left.png"))?;
    save_rgb(&rectified.right, &valid_args.out_dir.join("rectified_right.png"))?;
    println!("Saved rectified pair in {}", valid_args.out_dir.display());

    Ok(())
}

struct Args {
    calib_file_path: PathBuf,
    matches_file_path: PathBuf,
    left_image_path: PathBuf,
    right_image_path: PathBuf,
    out_dir: PathBuf,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args, String> {
    if let [_, calib, matches_file, left, right, out_dir] = args {
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
