pub mod enrollment;
pub mod grade;
pub mod student;
