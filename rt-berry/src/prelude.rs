//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::data::{
    DoseGrid, DoseStats, DoseUnits, Geometry, GeometryAttr, Grid, GridRecord, Mask, PlaneWindow,
};
pub use crate::roi::{Contour, MaskTemplate, PlaneRecord, Point2d, RasterSpec, Roi};

pub use crate::dose_map::{compute_dose_mask, DoseMask, MappedDose, Occupancy};
pub use crate::dvh::{compute_dvh, Dvh, DvhKind, DvhSpec, VolumeUnits};

pub use crate::transform::{self, Expansion, Shell};

pub use crate::consts::occupancy::{OFF, ON};
pub use crate::consts::{DEFAULT_DVH_BINS, DEFAULT_MASK_SIZE_XY};
pub use crate::error::{RtError, RtResult};
