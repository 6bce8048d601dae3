pub mod combination_grid;
