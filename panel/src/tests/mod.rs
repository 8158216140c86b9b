pub mod support;

mod repository;
