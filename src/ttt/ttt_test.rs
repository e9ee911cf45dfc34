#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    use crate::game::common::{GameColor, GameOutcome, GamePlayer, IGame, PlayerRand};
    use crate::ttt::ttt_game::{transform_idx, TttGame, TttPosition, MOVES_NUM};

    #[test]
    fn simple_game_and_mate() {
        let to_pos = |s: &str| TttPosition::from_str(s);
        assert!(to_pos("xxxoo____o").get_winner() == Some(GameColor::Player1));
        assert!(to_pos("oo_xxx___o").get_winner() == Some(GameColor::Player1));
        assert!(to_pos("oo____xxxo").get_winner() == Some(GameColor::Player1));
        assert!(to_pos("oxxo__ox_x").get_winner() == Some(GameColor::Player2));
        assert!(to_pos("xox_o_xo_x").get_winner() == Some(GameColor::Player2));
        assert!(to_pos("xxo__o_xox").get_winner() == Some(GameColor::Player2));
        assert!(to_pos("xxoooxxxoo").get_winner().is_none());

        let game = TttGame;
        assert_eq!(
            game.terminal_result(&to_pos("xxoooxxxoo")),
            Some(GameOutcome::Draw)
        );
        assert_eq!(game.terminal_result(&to_pos("xx_oo____x")), None);
    }

    #[test]
    fn canonical_observation_is_relative_to_turn() {
        let game = TttGame;
        let pos = TttPosition::from_str("x___o____x");
        let obs = game.canonical_observation(&pos);
        assert_eq!(obs[0], 1.0);
        assert_eq!(obs[4], -1.0);

        let pos = TttPosition::from_str("x___o____o");
        let obs = game.canonical_observation(&pos);
        assert_eq!(obs[0], -1.0);
        assert_eq!(obs[4], 1.0);
    }

    #[test]
    fn symmetries_are_distinct_permutations() {
        for transform in 0..8 {
            let image = (0..MOVES_NUM)
                .map(|idx| transform_idx(idx, transform))
                .collect::<HashSet<_>>();
            assert_eq!(image.len(), MOVES_NUM);
            /* center is fixed by every symmetry */
            assert_eq!(transform_idx(4, transform), 4);
        }
        let corners_images = (0..8).map(|t| transform_idx(0, t)).collect::<HashSet<_>>();
        assert_eq!(corners_images, HashSet::from([0, 2, 6, 8]));

        let game = TttGame;
        let obs = (0..MOVES_NUM).map(|i| i as f32).collect_vec();
        let policy = (0..MOVES_NUM).map(|i| i as f32 / 36.0).collect_vec();
        let syms = game.symmetries(&obs, &policy);
        assert_eq!(syms.len(), 8);
        assert_eq!(syms[0], (obs.clone(), policy.clone()));
        for (sym_obs, sym_policy) in &syms {
            /* observation and policy are permuted together */
            for idx in 0..MOVES_NUM {
                assert!((sym_policy[idx] * 36.0 - sym_obs[idx]).abs() < 1e-4);
            }
        }
        assert_eq!(syms.iter().map(|(o, _)| format!("{o:?}")).unique().count(), 8);
    }

    #[test]
    fn random_games_terminate() {
        let seed: u64 = rand::thread_rng().gen();
        println!("[{}] Using seed {}", stringify!(random_games_terminate), seed);
        let mut rand = StdRng::seed_from_u64(seed);

        let game = TttGame;
        for _ in 0..100 {
            let mut player = PlayerRand::from_seed(rand.gen());
            let mut pos = game.initial_state();
            let mut moves_num = 0;
            while game.terminal_result(&pos).is_none() {
                let legal = game.legal_moves(&pos);
                let m = player.next_moves(&game, &[&pos]).unwrap()[0];
                assert!(legal[m]);
                pos = game.apply_move(&pos, m);
                moves_num += 1;
            }
            assert!(moves_num <= MOVES_NUM);
            assert!(game.legal_moves(&pos).iter().all(|legal| !legal));
        }
    }
}
