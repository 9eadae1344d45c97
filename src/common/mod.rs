pub mod sourcemap;
