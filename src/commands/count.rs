use crate::param_grid::ParameterGrid;

pub fn run(grid: &ParameterGrid) -> usize {
    let count = grid.combination_count();
    println!(
        "{} combinations ({} fast/slow pairs x {} signal periods)",
        count,
        grid.pair_count(),
        grid.signal().len()
    );
    count
}
