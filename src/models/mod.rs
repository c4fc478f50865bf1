pub mod amount;
pub mod approval;
