/// Numbers per row of the review table
pub const COLUMNS: usize = 5;

pub type ReviewRow = [Option<u32>; COLUMNS];

/// Lay the numbers out in playback order, `COLUMNS` per row. The last row is
/// padded with empty cells.
pub fn rows(numbers: &[u32]) -> Vec<ReviewRow> {
    numbers
        .chunks(COLUMNS)
        .map(|chunk| {
            let mut row = [None; COLUMNS];
            for (cell, &n) in row.iter_mut().zip(chunk) {
                *cell = Some(n);
            }
            row
        })
        .collect()
}

pub fn row_count(len: usize) -> usize {
    len.div_ceil(COLUMNS)
}
