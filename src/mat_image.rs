//! Profile-monitor images.
//!
//! A saved camera grab is a 1x1 struct holding the image matrix next to the
//! camera geometry it was taken with: region of interest, sensor size,
//! resolution, orientation, screen center and filter state.

use std::path::Path;

use log::debug;

use crate::config::UnpackOptions;
use crate::error::UnpackError;
use crate::fields::{integer, integers, numeric, scalar, significant_dims, text, values, Record};
use crate::mat::{MatFile, MatValue, NumericArray};
use crate::models::MatImage;

pub const NAME: &str = "name";
pub const IMAGE: &str = "img";
pub const ROI_X_N: &str = "roiXN";
pub const ROI_Y_N: &str = "roiYN";
pub const TS: &str = "ts";
pub const PULSE_ID: &str = "pulseId";
pub const COLUMNS: &str = "nCol";
pub const ROWS: &str = "nRow";
pub const BIT_DEPTH: &str = "bitdepth";
pub const RESOLUTION: &str = "res";
pub const ROI_X: &str = "roiX";
pub const ROI_Y: &str = "roiY";
pub const ORIENT_X: &str = "orientX";
pub const ORIENT_Y: &str = "orientY";
pub const CENTER_X: &str = "centerX";
pub const CENTER_Y: &str = "centerY";
pub const FILTER_STATUS: &str = "filtStat";
pub const FILTER_OD: &str = "filtOD";
pub const IMAGE_ATTN: &str = "imgAttn";
pub const IS_RAW: &str = "isRaw";
pub const BACKGROUND: &str = "back";

const KNOWN_FIELDS: [&str; 21] = [
    NAME,
    IMAGE,
    ROI_X_N,
    ROI_Y_N,
    TS,
    PULSE_ID,
    COLUMNS,
    ROWS,
    BIT_DEPTH,
    RESOLUTION,
    ROI_X,
    ROI_Y,
    ORIENT_X,
    ORIENT_Y,
    CENTER_X,
    CENTER_Y,
    FILTER_STATUS,
    FILTER_OD,
    IMAGE_ATTN,
    IS_RAW,
    BACKGROUND,
];

impl MatImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, UnpackError> {
        MatImage::open_with(path, &UnpackOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let path = path.as_ref();
        let mat = MatFile::open(path)
            .map_err(|e| UnpackError::unreadable(path.display().to_string(), e))?;
        let mut image = MatImage::from_mat(&mat, opts)?;
        image.source = Some(path.to_path_buf());
        Ok(image)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnpackError> {
        MatImage::from_bytes_with(bytes, &UnpackOptions::default())
    }

    pub fn from_bytes_with(bytes: &[u8], opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let mat = MatFile::parse(bytes).map_err(|e| UnpackError::unreadable("<buffer>", e))?;
        MatImage::from_mat(&mat, opts)
    }

    pub fn from_mat(mat: &MatFile, opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let record = Record::from_mat(mat, opts)?;
        record.log_unknown(&KNOWN_FIELDS);

        let int_of = |name: &str| record.field(name).map(|v| integer(v, name)).transpose();
        let scalar_of = |name: &str| record.field(name).map(|v| scalar(v, name)).transpose();

        let image = MatImage {
            source: None,
            fields: record.field_names(),
            camera_name: record.field(NAME).map(|v| text(v, NAME)).transpose()?,
            image: record.field(IMAGE).map(unpack_image).transpose()?,
            roi_x_n: int_of(ROI_X_N)?,
            roi_y_n: int_of(ROI_Y_N)?,
            ts: scalar_of(TS)?,
            pulse_id: int_of(PULSE_ID)?,
            columns: int_of(COLUMNS)?,
            rows: int_of(ROWS)?,
            bit_depth: int_of(BIT_DEPTH)?,
            resolution: scalar_of(RESOLUTION)?,
            roi_x: int_of(ROI_X)?,
            roi_y: int_of(ROI_Y)?,
            orientation_x: int_of(ORIENT_X)?,
            orientation_y: int_of(ORIENT_Y)?,
            center_x: scalar_of(CENTER_X)?,
            center_y: scalar_of(CENTER_Y)?,
            filter_status: record
                .field(FILTER_STATUS)
                .map(|v| integers(v, FILTER_STATUS))
                .transpose()?,
            filter_od: record.field(FILTER_OD).map(|v| values(v, FILTER_OD)).transpose()?,
            image_attn: scalar_of(IMAGE_ATTN)?,
            is_raw: int_of(IS_RAW)?.map(|raw| raw != 0),
            background: record.field(BACKGROUND).cloned(),
        };

        let roi = image.roi_y_n.zip(image.roi_x_n);
        if let (Some(pixels), Some((rows, cols))) = (&image.image, roi) {
            let expected = [rows, cols].map(|d| usize::try_from(d).unwrap_or(usize::MAX));
            let found = [pixels.dims[0], pixels.dims.get(1).copied().unwrap_or(1)];
            if !pixels.is_empty() && found != expected {
                return Err(UnpackError::malformed(
                    IMAGE,
                    format!("image is {found:?} but the region of interest is {expected:?}"),
                ));
            }
        }

        debug!(
            "unpacked image from {} ({} pixels)",
            image.camera_name.as_deref().unwrap_or("<unknown camera>"),
            image.image.as_ref().map_or(0, |i| i.len())
        );
        Ok(image)
    }
}

fn unpack_image(value: &MatValue) -> Result<NumericArray, UnpackError> {
    let pixels = numeric(value, IMAGE)?;
    if significant_dims(&pixels.dims).len() > 2 || pixels.dims.is_empty() {
        return Err(UnpackError::malformed(
            IMAGE,
            format!("expected a 2-D image, found dimensions {:?}", pixels.dims),
        ));
    }
    Ok(pixels.clone())
}
