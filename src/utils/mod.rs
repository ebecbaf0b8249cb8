mod tensor;
mod validation;

// Array <-> tensor conversion at the model boundary
pub use tensor::{array3_from_tensor, array4_from_tensor, to_tensor};

// Validation operations
pub use validation::{fix_length, mse, valid_audio};
