pub use anyhow::{anyhow, bail, ensure, Context};
pub use log;
pub use ndarray::{array, s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Zip};
pub use serde::{Deserialize, Serialize};
pub use std::ffi::OsStr;
pub use std::fs::File;
pub use std::path::{Path, PathBuf};

pub use crate::error::ThermoError;
pub use crate::proc_macros::{ApproxEq, HistoryVec};
pub use crate::segment::{Segment, N_COMPARTMENTS, N_SEGMENTS};
pub use crate::traits::*;
pub use crate::utils;
