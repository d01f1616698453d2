use super::*;

fn encoded(state: State) -> BaseState {
    let mut out = BaseState::zeroed(STATE_BYTES);
    state.encode(&mut out);
    out
}

#[test]
fn test_initial_state() {
    let state = State::new();
    assert_eq!(state.board, [0; 9]);
    assert_eq!(state.current_player, 1);
    assert!(!state.is_done());
}

#[test]
fn test_all_winning_lines() {
    for player in [1u8, 2u8] {
        for line in &[
            [0, 1, 2],
            [3, 4, 5],
            [6, 7, 8],
            [0, 3, 6],
            [1, 4, 7],
            [2, 5, 8],
            [0, 4, 8],
            [2, 4, 6],
        ] {
            let mut board = [0u8; 9];
            for &cell in line {
                board[cell] = player;
            }
            assert_eq!(check_winner(&board), player, "line {line:?}");
        }
    }
}

#[test]
fn test_draw_detection() {
    // x o x / x o o / o x x
    let board = [1, 2, 1, 1, 2, 2, 2, 1, 1];
    assert_eq!(check_winner(&board), 3);
}

#[test]
fn test_make_move_switches_player() {
    let state = State::new();
    let next = state.make_move(4);

    assert_eq!(next.board[4], 1);
    assert_eq!(next.current_player, 2);
    assert!(!next.is_done());
}

#[test]
fn test_state_encode_decode_roundtrip() {
    let state = State {
        board: [1, 0, 2, 0, 1, 0, 2, 0, 0],
        current_player: 2,
        winner: 0,
    };

    let bytes = encoded(state);
    assert_eq!(State::decode(&bytes), state);
}

#[test]
fn test_mover_has_board_legals_other_has_noop() {
    let mut sm = TicTacToe::new();
    sm.update_bases(&sm.initial_state());

    assert!(!sm.is_terminal());
    assert_eq!(sm.legal_moves(0).len(), 9);
    assert_eq!(sm.legal_moves(1), &[NOOP]);

    // After x moves, the roles swap.
    let state = encoded(State::new().make_move(0));
    sm.update_bases(&state);
    assert_eq!(sm.legal_moves(0), &[NOOP]);
    assert_eq!(sm.legal_moves(1).len(), 8);
}

#[test]
fn test_next_state_applies_joint_move() {
    let mut sm = TicTacToe::new();
    sm.update_bases(&sm.initial_state());

    let mv = JointMove::from_indices(&[4, NOOP]);
    let mut out = sm.new_base_state();
    sm.next_state(&mv, &mut out);

    let next = State::decode(&out);
    assert_eq!(next.board[4], 1);
    assert_eq!(next.current_player, 2);
}

#[test]
fn test_goal_values() {
    let mut sm = TicTacToe::new();

    // x completes the top row.
    let won = State {
        board: [1, 1, 1, 2, 2, 0, 0, 0, 0],
        current_player: 1,
        winner: 1,
    };
    sm.update_bases(&encoded(won));
    assert!(sm.is_terminal());
    assert_eq!(sm.goal_value(0), 100);
    assert_eq!(sm.goal_value(1), 0);

    let drawn = State {
        board: [1, 2, 1, 1, 2, 2, 2, 1, 1],
        current_player: 1,
        winner: 3,
    };
    sm.update_bases(&encoded(drawn));
    assert_eq!(sm.goal_value(0), 50);
    assert_eq!(sm.goal_value(1), 50);
}

#[test]
fn test_terminal_state_has_no_legals() {
    let mut sm = TicTacToe::new();
    let won = State {
        board: [1, 1, 1, 2, 2, 0, 0, 0, 0],
        current_player: 1,
        winner: 1,
    };
    sm.update_bases(&encoded(won));

    assert!(sm.legal_moves(0).is_empty());
    assert!(sm.legal_moves(1).is_empty());
}

#[test]
fn test_transformer_channel_shapes() {
    let transformer = TicTacToeTransformer::new();
    assert_eq!(transformer.channel_len(), 40);
    assert_eq!(transformer.num_policies(), 2);

    let state = encoded(State::new().make_move(0));
    let prev = encoded(State::new());

    let mut out = vec![0.0; transformer.channel_len()];
    transformer.to_channels(&state, &[&prev], &mut out);

    // x at cell 0 in the current state, empty history board.
    assert_eq!(out[0], 1.0);
    assert_eq!(out[19], 1.0); // o to move
    assert!(out[20..29].iter().all(|&v| v == 0.0));
    assert_eq!(out[STATE_CHANNELS + 18], 1.0); // x was to move
}

#[test]
fn test_transformer_pads_missing_history() {
    let transformer = TicTacToeTransformer::new();
    let state = encoded(State::new());

    let mut out = vec![0.0; transformer.channel_len()];
    transformer.to_channels(&state, &[], &mut out);

    assert!(out[STATE_CHANNELS..].iter().all(|&v| v == 0.0));
}

#[test]
fn test_move_names() {
    let sm = TicTacToe::new();
    assert_eq!(sm.legal_to_move(0, 4), "mark-1-1");
    assert_eq!(sm.legal_to_move(1, NOOP), "noop");
}
