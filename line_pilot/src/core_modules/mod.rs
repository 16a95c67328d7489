pub mod annotate;
pub mod color_profile;
pub mod color_segmenter;
pub mod contour_extractor;
pub mod controller;
pub mod flight_mode;
pub mod frame;
pub mod hough_extractor;
pub mod hsv_pixel;
pub mod line_candidate;
pub mod mask;
pub mod safety_monitor;
pub mod tracking;
pub mod utils;
