pub mod batch;
pub mod bitmap;
pub mod column;
pub mod datatype;
pub mod row;
pub mod scalar;
pub mod slot;
pub mod sort;
