pub mod requestmodel;
pub mod usermodel;
