pub mod residents;
