pub mod constants;
pub mod convert_utils;
pub mod input_utils;
pub mod pipeline_utils;
pub mod prog_utils;
pub mod reference_utils;
pub mod workspace;
