pub mod sqlmap;
