//! End-to-end behaviour of the simulation engine

use aurora_traffic::simulation::{
    congested_roads, AgentProfile, Direction, GridConfig, IntersectionId, LightState, RoadId,
    SimAgent, SimConfig, SimId, SimWorld, Strategy,
};
use std::collections::BTreeMap;

fn config(rows: usize, cols: usize, agents: usize, seed: u64) -> SimConfig {
    SimConfig {
        grid: GridConfig {
            rows,
            cols,
            ..GridConfig::default()
        },
        agent_count: agents,
        seed: Some(seed),
        ..SimConfig::default()
    }
}

fn started(config: SimConfig) -> SimWorld {
    let mut world = SimWorld::new(config).unwrap();
    world.start();
    world
}

#[test]
fn test_world_starts_paused_with_full_population() {
    let world = SimWorld::new(config(3, 2, 40, 1)).unwrap();
    assert!(!world.is_running());
    assert_eq!(world.agent_count(), 40);
    assert_eq!(world.tick_count(), 0);

    let stats = world.stats();
    assert_eq!(stats.active_agents, 40);
    assert_eq!(stats.total_agents_spawned, 40);
    assert_eq!(stats.trips_completed, 0);

    for agent in world.agents() {
        assert_ne!(agent.origin, agent.destination);
        assert!(!agent.route().is_empty());
        let coefficients = agent.profile.coefficients();
        assert!(agent.max_speed >= coefficients.min_speed);
        assert!(agent.max_speed <= coefficients.max_speed);
    }
}

#[test]
fn test_invariants_hold_over_a_long_run() {
    let mut world = started(config(3, 2, 40, 7));

    for _ in 0..1000 {
        assert!(world.update(Some(1.0 / 60.0)));

        assert_eq!(world.agent_count(), 40);
        let on_roads: usize = world
            .network()
            .roads()
            .values()
            .map(|road| road.agent_count)
            .sum();
        assert!(on_roads <= world.agent_count());

        for agent in world.agents() {
            assert!(!agent.has_reached_destination);
            assert!(agent.speed >= 0.0);
            assert!(agent.speed <= agent.max_speed + 1e-4);
            assert!(agent.route_index() <= agent.route().len());
            if let Some(road_id) = agent.current_road {
                let length = world.network().road(road_id).unwrap().length;
                assert!(agent.distance_along_road <= length);
            }
        }

        for road in world.network().roads().values() {
            assert!(road.current_density >= 0.0 && road.current_density <= 100.0);
            assert!(road.current_speed <= road.speed_limit);
        }
    }

    assert_eq!(world.tick_count(), 1000);
    assert!((world.time() - 1000.0 / 60.0).abs() < 1e-2);
}

#[test]
fn test_arrived_agents_are_respawned() {
    let mut cfg = config(1, 2, 4, 3);
    cfg.grid.spacing = 50.0;
    let mut world = started(cfg);
    let first_ids: Vec<_> = world.agents().map(|agent| agent.id).collect();

    for _ in 0..600 {
        world.update(Some(0.1));
        assert_eq!(world.agent_count(), 4);
        assert!(world.agents().all(|agent| !agent.has_reached_destination));
    }

    let stats = world.stats();
    assert!(stats.trips_completed > 0);
    assert_eq!(stats.total_agents_spawned, 4 + stats.trips_completed);

    // respawned agents get fresh ids
    let current_ids: Vec<_> = world.agents().map(|agent| agent.id).collect();
    assert_ne!(current_ids, first_ids);
    assert!(current_ids.iter().any(|id| id.0 .0 >= 4));
}

#[test]
fn test_respawn_never_targets_the_intersection_just_reached() {
    let mut cfg = config(1, 2, 1, 1);
    cfg.grid.spacing = 30.0;
    let mut world = started(cfg);
    let mut respawns = 0;

    for _ in 0..20_000 {
        let before = world.agents().next().unwrap().clone();
        world.update(Some(0.1));
        let after = world.agents().next().unwrap();

        if after.id != before.id {
            respawns += 1;
            assert_eq!(after.origin, before.destination);
            assert_ne!(after.destination, before.destination);
        }
    }

    assert!(respawns > 50, "only {} respawns", respawns);
}

#[test]
fn test_network_tracks_every_agent_where_it_ended_the_tick() {
    let mut world = started(config(3, 3, 25, 4));
    for _ in 0..120 {
        world.update(Some(0.1));
    }

    let mut per_road: BTreeMap<RoadId, usize> = BTreeMap::new();
    for agent in world.agents() {
        let marker = world.network().agent_marker(agent.id).unwrap();
        assert_eq!(*marker, agent.marker());
        if let Some(road_id) = agent.current_road {
            *per_road.entry(road_id).or_default() += 1;
        }
    }
    for road_id in world.network().roads().keys() {
        let expected = per_road.get(road_id).copied().unwrap_or(0);
        assert_eq!(world.network().agents_on_road(*road_id), expected);
    }
}

#[test]
fn test_pause_stops_all_state_changes() {
    let mut world = started(config(3, 3, 20, 11));
    for _ in 0..50 {
        world.update(None);
    }

    world.pause();
    world.pause();
    assert!(!world.is_running());

    let agents: Vec<SimAgent> = world.agents().cloned().collect();
    let roads = world.network().roads().clone();
    let intersections = world.network().intersections().clone();
    let tick = world.tick_count();

    for _ in 0..10 {
        assert!(!world.update(Some(0.1)));
    }

    assert_eq!(world.agents().cloned().collect::<Vec<_>>(), agents);
    assert_eq!(world.network().roads(), &roads);
    assert_eq!(world.network().intersections(), &intersections);
    assert_eq!(world.tick_count(), tick);

    world.start();
    world.start();
    assert!(world.is_running());
    assert!(world.update(None));
    assert_eq!(world.tick_count(), tick + 1);
}

#[test]
fn test_update_step_handling() {
    let mut world = started(config(2, 2, 5, 5));

    assert!(world.update(Some(5.0)));
    assert!((world.time() - 0.1).abs() < 1e-6);

    assert!(world.update(None));
    assert!((world.time() - (0.1 + 1.0 / 60.0)).abs() < 1e-6);

    assert!(!world.update(Some(0.0)));
    assert!(!world.update(Some(-1.0)));
    assert!(!world.update(Some(f32::NAN)));
    assert_eq!(world.tick_count(), 2);
}

#[test]
fn test_reset_restores_initial_state() {
    let mut world = started(config(3, 3, 30, 13));
    world.set_strategy(Strategy::Aurora);
    for _ in 0..300 {
        world.update(Some(0.1));
    }

    world.reset();

    assert!(!world.is_running());
    assert_eq!(world.tick_count(), 0);
    assert_eq!(world.time(), 0.0);
    assert_eq!(world.agent_count(), 30);
    assert_eq!(world.network().intersection_count(), 9);
    assert_eq!(world.network().total_queued(), 0);
    assert_eq!(world.orchestrator().invocations(), 0);
    assert_eq!(world.strategy(), Strategy::Aurora);

    for agent in world.agents() {
        assert_eq!(agent.current_road, None);
        assert_eq!(agent.route_index(), 0);
        assert_eq!(agent.speed, 0.0);
    }

    for intersection in world.network().intersections().values() {
        let east = intersection.light(Direction::East).unwrap();
        assert_eq!(east.state(), LightState::Green);
        assert_eq!(east.remaining_time(), 25.0);
        assert_eq!(east.green_duration(), 25.0);
        let north = intersection.light(Direction::North).unwrap();
        assert_eq!(north.state(), LightState::Red);
        assert_eq!(north.red_duration(), 30.0);
    }

    let stats = world.stats();
    assert_eq!(stats.tick, 0);
    assert_eq!(stats.trips_completed, 0);
    assert_eq!(stats.total_agents_spawned, 30);
}

#[test]
fn test_strategy_switch_reroutes_only_onto_clear_roads() {
    let mut world = started(config(3, 3, 40, 21));
    for _ in 0..200 {
        world.update(Some(1.0 / 60.0));
    }

    let middle_row: Vec<IntersectionId> = world.network().default_corridor();
    let jammed: Vec<RoadId> = middle_row
        .windows(2)
        .map(|pair| world.network().find_road_between(pair[0], pair[1]).unwrap())
        .collect();
    for road_id in &jammed {
        world.set_live_density(*road_id, Some(90.0)).unwrap();
    }

    let before: BTreeMap<_, Vec<RoadId>> = world
        .agents()
        .map(|agent| (agent.id, agent.upcoming_roads().to_vec()))
        .collect();

    let rerouted = world.set_strategy(Strategy::Aurora);
    assert_eq!(world.strategy(), Strategy::Aurora);
    assert_eq!(world.stats().strategy, Strategy::Aurora);

    let congested = congested_roads(world.orchestrator().last_predictions());
    for road_id in &jammed {
        assert!(congested.contains(road_id));
    }

    let mut changed = 0;
    for agent in world.agents() {
        let upcoming = agent.upcoming_roads();
        if upcoming != before[&agent.id].as_slice() {
            changed += 1;
            assert!(!upcoming.is_empty());
            assert!(upcoming.iter().all(|road_id| !congested.contains(road_id)));
            let last = world.network().road(*upcoming.last().unwrap()).unwrap();
            assert_eq!(last.end_intersection, agent.destination);
        }
    }
    assert_eq!(changed, rerouted);

    for _ in 0..300 {
        assert!(world.update(Some(1.0 / 60.0)));
        assert_eq!(world.agent_count(), 40);
    }
}

#[test]
fn test_switching_between_all_strategies() {
    let mut world = started(config(3, 3, 25, 17));
    for strategy in [
        Strategy::Predictive,
        Strategy::Aurora,
        Strategy::Default,
        Strategy::Aurora,
    ] {
        world.set_strategy(strategy);
        for _ in 0..120 {
            world.update(Some(0.1));
        }
        assert_eq!(world.stats().strategy, strategy);
        assert_eq!(world.agent_count(), 25);
    }
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let run = || {
        let mut cfg = config(3, 3, 30, 42);
        cfg.strategy = Strategy::Aurora;
        let mut world = started(cfg);
        for _ in 0..300 {
            world.update(Some(0.1));
        }
        let stats = world.stats();
        (
            world.agents().cloned().collect::<Vec<_>>(),
            stats.trips_completed,
            stats.total_queued,
        )
    };
    assert_eq!(run(), run());
}

#[test]
fn test_rider_population_accumulates_statistics() {
    let mut cfg = config(3, 3, 30, 9);
    cfg.profile_mix = SimConfig::rider_mix();
    cfg.hazard_count = 25;
    let mut world = started(cfg);

    for _ in 0..600 {
        world.update(Some(0.1));
    }

    let stats = world.stats();
    assert_eq!(stats.riders, stats.active_agents);
    assert!(stats.average_fatigue > 0.0);
    assert!(stats.average_safety_score <= 100.0);
    assert!(stats.average_stress >= 0.0);
    assert!(world.agents().all(|agent| agent.profile.is_rider()));
}

#[test]
fn test_spawn_agent_validates_endpoints() {
    let mut world = SimWorld::new(config(2, 2, 0, 1)).unwrap();
    let a = world.network().intersection_at(0, 0).unwrap();
    let b = world.network().intersection_at(1, 1).unwrap();

    let id = world.spawn_agent(a, b, AgentProfile::Commuter).unwrap();
    assert_eq!(world.agent(id).map(|agent| agent.route().len()), Some(2));

    let missing = IntersectionId(SimId(9999));
    let err = world
        .spawn_agent(a, missing, AgentProfile::Vehicle)
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert!(world.spawn_agent(a, a, AgentProfile::Vehicle).is_err());
    assert_eq!(world.agent_count(), 1);
}

#[test]
fn test_invalid_configuration_is_rejected() {
    assert!(SimWorld::new(config(0, 3, 10, 1)).is_err());

    let mut cfg = config(2, 2, 10, 1);
    cfg.max_step = 0.0;
    assert!(SimWorld::new(cfg).is_err());

    let mut cfg = config(2, 2, 10, 1);
    cfg.profile_mix.clear();
    assert!(SimWorld::new(cfg).is_err());
}

#[test]
fn test_live_density_feed() {
    let mut world = started(config(2, 2, 0, 1));
    let road_id = *world.network().roads().keys().next().unwrap();

    world.set_live_density(road_id, Some(60.0)).unwrap();
    world.update(None);
    assert_eq!(world.stats().roads_by_level.gridlock, 1);

    assert!(world.set_live_density(road_id, Some(-5.0)).is_err());
    assert!(world
        .set_live_density(RoadId(SimId(9999)), Some(5.0))
        .is_err());

    let json = serde_json::to_value(world.stats()).unwrap();
    assert_eq!(json["roads_by_level"]["gridlock"], 1);
    assert_eq!(json["strategy"], "Default");
}
