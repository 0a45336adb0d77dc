//! Orchestration strategies: retiming, lane priority, green waves,
//! emergency relief and rerouting

use aurora_traffic::simulation::{
    congested_roads, intersections_along, AgentId, AgentProfile, Direction, GridConfig,
    IntersectionId, LightState, LightTimings, Orchestrator, OrchestratorReport, SimAgent, SimId,
    SimRoadNetwork, Strategy, TrafficLight, MAX_REROUTES_PER_PASS, REROUTE_INTERVAL,
};
use std::collections::BTreeMap;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

fn grid(rows: usize, cols: usize) -> SimRoadNetwork {
    let config = GridConfig {
        rows,
        cols,
        ..GridConfig::default()
    };
    SimRoadNetwork::from_grid(&config, LightTimings::default()).unwrap()
}

fn light(network: &SimRoadNetwork, id: IntersectionId, direction: Direction) -> TrafficLight {
    network
        .intersection(id)
        .unwrap()
        .light(direction)
        .cloned()
        .unwrap()
}

fn queue_up(network: &mut SimRoadNetwork, id: IntersectionId, direction: Direction, count: usize) {
    let offset = 1000 * (direction as usize + 1);
    let intersection = network.intersection_mut(id).unwrap();
    for n in 0..count {
        intersection.enqueue(direction, AgentId(SimId(offset + n)));
    }
}

fn agent(network: &SimRoadNetwork, n: usize, from: IntersectionId, to: IntersectionId) -> SimAgent {
    SimAgent::new(
        AgentId(SimId(n)),
        AgentProfile::Vehicle,
        from,
        to,
        network.shortest_path(from, to),
        network.intersection(from).unwrap().position,
        50.0,
    )
}

#[test]
fn test_default_strategy_leaves_lights_alone() {
    let mut network = grid(2, 2);
    let before = network.intersections().clone();
    let mut orchestrator = Orchestrator::new(Strategy::Default, network.default_corridor());

    for _ in 0..10 {
        let report = orchestrator.run(&mut network, &mut BTreeMap::new());
        assert_eq!(report, OrchestratorReport::default());
    }
    assert_eq!(network.intersections(), &before);
    assert_eq!(orchestrator.invocations(), 0);
}

#[test]
fn test_predictive_retiming() {
    let mut network = grid(1, 3);
    let a = network.intersection_at(0, 0).unwrap();
    let b = network.intersection_at(0, 1).unwrap();
    let a_to_b = network.find_road_between(a, b).unwrap();
    network.set_live_density(a_to_b, Some(60.0)).unwrap();
    queue_up(&mut network, b, Direction::North, 4);

    let mut orchestrator = Orchestrator::new(Strategy::Predictive, network.default_corridor());
    let report = orchestrator.run(&mut network, &mut BTreeMap::new());
    assert!(report.lights_retimed > 0);
    assert!(!report.green_wave_applied);

    // heavy forecast feeding b from the west lengthens its east green
    assert!(approx(light(&network, b, Direction::East).green_duration(), 32.5));
    // so does a long queue even with nothing forecast
    assert!(approx(light(&network, b, Direction::North).green_duration(), 32.5));
    // quiet headings shrink into the short range
    assert!(approx(light(&network, b, Direction::West).green_duration(), 20.0));
    assert!(approx(light(&network, b, Direction::South).green_duration(), 20.0));

    // increases are capped
    for _ in 0..10 {
        orchestrator.run(&mut network, &mut BTreeMap::new());
    }
    assert!(approx(light(&network, b, Direction::East).green_duration(), 35.0));
    assert!(approx(light(&network, b, Direction::West).green_duration(), 8.0));
    assert_eq!(orchestrator.predictor().history(a_to_b).unwrap().len(), 11);
}

#[test]
fn test_predictive_skips_lane_priority_and_relief() {
    let mut network = grid(3, 3);
    let center = network.intersection_at(1, 1).unwrap();
    queue_up(&mut network, center, Direction::East, 16);

    let mut orchestrator = Orchestrator::new(Strategy::Predictive, network.default_corridor());
    let report = orchestrator.run(&mut network, &mut BTreeMap::new());
    assert_eq!(report.priority_boosts, 0);
    assert_eq!(report.emergency_reliefs, 0);
    assert!(approx(
        light(&network, center, Direction::East).red_duration(),
        30.0
    ));
}

#[test]
fn test_lane_priority_favours_longest_queue() {
    let mut network = grid(3, 3);
    let center = network.intersection_at(1, 1).unwrap();
    queue_up(&mut network, center, Direction::South, 6);

    let mut orchestrator = Orchestrator::new(Strategy::Aurora, network.default_corridor());
    let report = orchestrator.run(&mut network, &mut BTreeMap::new());
    assert_eq!(report.priority_boosts, 1);
    assert_eq!(report.emergency_reliefs, 0);

    let south = light(&network, center, Direction::South);
    assert!(approx(south.green_duration(), 30.0));
    assert!(approx(south.red_duration(), 10.0));
    for direction in [Direction::North, Direction::East, Direction::West] {
        let other = light(&network, center, direction);
        assert!(approx(other.green_duration(), 12.0));
        assert!(approx(other.red_duration(), 25.0));
    }
}

#[test]
fn test_emergency_relief_for_gridlocked_intersection() {
    let mut network = grid(3, 3);
    let west = network.intersection_at(1, 0).unwrap();
    let center = network.intersection_at(1, 1).unwrap();
    let feeding = network.find_road_between(west, center).unwrap();
    network.set_live_density(feeding, Some(80.0)).unwrap();
    queue_up(&mut network, center, Direction::East, 16);

    let mut orchestrator = Orchestrator::new(Strategy::Aurora, network.default_corridor());
    let report = orchestrator.run(&mut network, &mut BTreeMap::new());
    assert_eq!(report.emergency_reliefs, 1);

    let east = light(&network, center, Direction::East);
    assert!(approx(east.green_duration(), 40.0));
    assert!(approx(east.red_duration(), 5.0));
    let north = light(&network, center, Direction::North);
    assert!(approx(north.green_duration(), 12.0));
    assert!(approx(north.red_duration(), 25.0));
}

#[test]
fn test_emergency_relief_takes_turns() {
    let mut network = grid(3, 3);
    let center = network.intersection_at(1, 1).unwrap();
    queue_up(&mut network, center, Direction::North, 8);
    queue_up(&mut network, center, Direction::East, 8);

    let mut orchestrator = Orchestrator::new(Strategy::Aurora, network.default_corridor());

    orchestrator.run(&mut network, &mut BTreeMap::new());
    assert!(approx(light(&network, center, Direction::North).green_duration(), 40.0));
    assert!(approx(light(&network, center, Direction::North).red_duration(), 5.0));
    assert!(approx(light(&network, center, Direction::East).green_duration(), 12.0));

    orchestrator.run(&mut network, &mut BTreeMap::new());
    assert!(approx(light(&network, center, Direction::East).green_duration(), 40.0));
    assert!(approx(light(&network, center, Direction::East).red_duration(), 5.0));
    assert!(approx(light(&network, center, Direction::North).green_duration(), 30.0));
}

#[test]
fn test_green_wave_staggers_corridor() {
    let mut network = grid(1, 3);
    let a = network.intersection_at(0, 0).unwrap();
    let b = network.intersection_at(0, 1).unwrap();
    let c = network.intersection_at(0, 2).unwrap();
    assert_eq!(network.default_corridor(), vec![a, b, c]);

    let mut orchestrator = Orchestrator::new(Strategy::Aurora, network.default_corridor());
    let report = orchestrator.run(&mut network, &mut BTreeMap::new());
    assert!(report.green_wave_applied);

    // downstream greens are extended past the head's remaining green
    assert!(approx(light(&network, b, Direction::East).remaining_time(), 30.0));
    assert!(approx(light(&network, c, Direction::East).remaining_time(), 35.0));
    assert!(approx(light(&network, b, Direction::West).remaining_time(), 30.0));
    assert!(approx(light(&network, a, Direction::East).remaining_time(), 25.0));

    // head is still in the same green phase
    let report = orchestrator.run(&mut network, &mut BTreeMap::new());
    assert!(!report.green_wave_applied);

    network.update_lights(25.0);
    orchestrator.run(&mut network, &mut BTreeMap::new());
    network.update_lights(5.0);
    orchestrator.run(&mut network, &mut BTreeMap::new());
    network.update_lights(30.0);
    assert_eq!(light(&network, a, Direction::East).state(), LightState::Green);

    let report = orchestrator.run(&mut network, &mut BTreeMap::new());
    assert!(report.green_wave_applied);

    let b_east = light(&network, b, Direction::East);
    assert_eq!(b_east.state(), LightState::Red);
    assert!(approx(b_east.remaining_time(), 5.0));

    // yellow is left to finish on its own
    let c_east = light(&network, c, Direction::East);
    assert_eq!(c_east.state(), LightState::Yellow);
    assert!(approx(c_east.remaining_time(), 5.0));
}

#[test]
fn test_periodic_reroute_avoids_congestion() {
    let mut network = grid(3, 3);
    let start = network.intersection_at(0, 0).unwrap();
    let middle = network.intersection_at(0, 1).unwrap();
    let end = network.intersection_at(0, 2).unwrap();
    let jammed = network.find_road_between(middle, end).unwrap();
    network.set_live_density(jammed, Some(80.0)).unwrap();

    let mut agents: BTreeMap<AgentId, SimAgent> = (0..8)
        .map(|n| {
            let agent = agent(&network, n, start, end);
            (agent.id, agent)
        })
        .collect();
    assert!(agents.values().all(|agent| agent.route().contains(&jammed)));

    let mut orchestrator = Orchestrator::new(Strategy::Aurora, network.default_corridor());
    for _ in 1..REROUTE_INTERVAL {
        let report = orchestrator.run(&mut network, &mut agents);
        assert_eq!(report.agents_rerouted, 0);
    }
    assert!(agents.values().all(|agent| !agent.rerouted));

    let report = orchestrator.run(&mut network, &mut agents);
    assert_eq!(report.agents_rerouted, MAX_REROUTES_PER_PASS);

    let congested = congested_roads(orchestrator.last_predictions());
    assert!(congested.contains(&jammed));

    let rerouted: Vec<&SimAgent> = agents.values().filter(|agent| agent.rerouted).collect();
    assert_eq!(rerouted.len(), MAX_REROUTES_PER_PASS);
    for agent in rerouted {
        let route = agent.route();
        assert!(!route.is_empty());
        assert!(route.iter().all(|road_id| !congested.contains(road_id)));
        let path = intersections_along(&network, route);
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&end));
        assert!(agent.state.time_saved > 0.0);
    }
}

#[test]
fn test_reroute_keeps_route_without_clear_alternative() {
    let mut network = grid(1, 3);
    let a = network.intersection_at(0, 0).unwrap();
    let b = network.intersection_at(0, 1).unwrap();
    let c = network.intersection_at(0, 2).unwrap();
    let jammed = network.find_road_between(b, c).unwrap();
    network.set_live_density(jammed, Some(90.0)).unwrap();

    let original = agent(&network, 0, a, c);
    let mut agents = BTreeMap::from([(original.id, original.clone())]);

    let mut orchestrator = Orchestrator::new(Strategy::Aurora, network.default_corridor());
    assert_eq!(orchestrator.reroute_all(&network, &mut agents), 0);
    assert_eq!(agents[&original.id], original);
}

#[test]
fn test_default_reroute_restores_shortest_path() {
    let network = grid(2, 2);
    let a = network.intersection_at(0, 0).unwrap();
    let b = network.intersection_at(0, 1).unwrap();
    let direct = network.find_road_between(a, b).unwrap();

    let mut detour = agent(&network, 0, a, b);
    let avoid = [direct].into_iter().collect();
    let long_way = network.shortest_path_avoiding(a, b, &avoid);
    assert_eq!(long_way.len(), 3);
    detour.replace_upcoming_route(long_way, 0.0);
    detour.rerouted = false;

    let mut agents = BTreeMap::from([(detour.id, detour)]);
    let mut orchestrator = Orchestrator::new(Strategy::Default, network.default_corridor());
    assert_eq!(orchestrator.reroute_all(&network, &mut agents), 1);

    let agent = &agents[&AgentId(SimId(0))];
    assert_eq!(agent.route(), &[direct]);
    assert!(agent.rerouted);
    assert!(agent.state.time_saved > 0.0);
}

#[test]
fn test_set_strategy_clears_state() {
    let mut network = grid(2, 2);
    let mut orchestrator = Orchestrator::new(Strategy::Predictive, network.default_corridor());
    for _ in 0..3 {
        orchestrator.run(&mut network, &mut BTreeMap::new());
    }
    assert_eq!(orchestrator.invocations(), 3);
    assert!(!orchestrator.last_predictions().is_empty());

    orchestrator.set_strategy(Strategy::Aurora);
    assert_eq!(orchestrator.strategy(), Strategy::Aurora);
    assert_eq!(orchestrator.invocations(), 0);
    assert!(orchestrator.last_predictions().is_empty());
    let road_id = *network.roads().keys().next().unwrap();
    assert!(orchestrator.predictor().history(road_id).is_none());
}
