use criterion::{Criterion, criterion_group, criterion_main};
use game_core::board::Board;
use game_core::lookup_table::MoveTable;
use game_core::moves::Direction;
use game_core::row::shift_row_left;
use game_core::simulator::Simulator;
use std::hint::black_box;

fn bench_build_table(c: &mut Criterion) {
    c.bench_function("lookup_table_build", |b| b.iter(MoveTable::build));
}

fn bench_shift_row(c: &mut Criterion) {
    c.bench_function("row_shift_left_direct", |b| {
        b.iter(|| shift_row_left(black_box(0x1122)))
    });
}

fn bench_board_shift(c: &mut Criterion) {
    let table = MoveTable::build();
    let board = Board::from_rows([0x1122, 0x0301, 0x2200, 0x1001]);

    c.bench_function("board_shift_all_directions", |b| {
        b.iter(|| {
            for direction in Direction::ALL {
                black_box(black_box(board).shift(direction, table.table()));
            }
        })
    });
}

fn bench_valid_moves(c: &mut Criterion) {
    let board = Board::from_rows([0x1212, 0x2121, 0x1212, 0x2122]);

    c.bench_function("board_valid_moves", |b| {
        b.iter(|| black_box(board).valid_moves())
    });
}

fn bench_episode(c: &mut Criterion) {
    let table = MoveTable::build();

    c.bench_function("simulator_episode_first_move", |b| {
        b.iter(|| {
            let mut sim = Simulator::new(0, black_box(7), table.table());
            while !sim.is_game_over() {
                if let Some(direction) = sim.valid_moves().iter().next() {
                    sim.apply(direction.code());
                }
            }
            sim.score()
        })
    });
}

criterion_group!(
    benches,
    bench_build_table,
    bench_shift_row,
    bench_board_shift,
    bench_valid_moves,
    bench_episode
);
criterion_main!(benches);
