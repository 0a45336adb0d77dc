//! Breadth-first route search
//!
//! Every road costs the same, so the result is the route with the fewest
//! segments. Neighbours are expanded in the graph's edge order, which is
//! fixed for a given network, so ties always resolve the same way.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::road_network::SimRoadNetwork;
use super::types::{IntersectionId, RoadId};

/// Fewest-roads route; empty when `start == end` or `end` is unreachable
pub fn shortest_path(
    network: &SimRoadNetwork,
    start: IntersectionId,
    end: IntersectionId,
) -> Vec<RoadId> {
    shortest_path_avoiding(network, start, end, &BTreeSet::new())
}

/// Fewest-roads route that never uses a road in `avoid`
pub fn shortest_path_avoiding(
    network: &SimRoadNetwork,
    start: IntersectionId,
    end: IntersectionId,
    avoid: &BTreeSet<RoadId>,
) -> Vec<RoadId> {
    if start == end {
        return Vec::new();
    }
    if network.outgoing_roads(start).is_none() || network.outgoing_roads(end).is_none() {
        return Vec::new();
    }

    // intersection -> (previous intersection, road taken to get here)
    let mut came_from: BTreeMap<IntersectionId, (IntersectionId, RoadId)> = BTreeMap::new();
    let mut visited = BTreeSet::from([start]);
    let mut frontier = VecDeque::from([start]);

    while let Some(current) = frontier.pop_front() {
        if current == end {
            break;
        }
        for (road_id, next) in network.outgoing_roads(current).unwrap_or_default() {
            if avoid.contains(&road_id) || !visited.insert(next) {
                continue;
            }
            came_from.insert(next, (current, road_id));
            frontier.push_back(next);
        }
    }

    if !came_from.contains_key(&end) {
        return Vec::new();
    }

    let mut roads = Vec::new();
    let mut cursor = end;
    while cursor != start {
        match came_from.get(&cursor) {
            Some((previous, road_id)) => {
                roads.push(*road_id);
                cursor = *previous;
            }
            None => return Vec::new(),
        }
    }
    roads.reverse();
    roads
}

/// Intersections visited by a road route, starting with the first road's start
pub fn intersections_along(network: &SimRoadNetwork, route: &[RoadId]) -> Vec<IntersectionId> {
    let mut path = Vec::with_capacity(route.len() + 1);
    for (index, road_id) in route.iter().enumerate() {
        if let Ok(road) = network.road(*road_id) {
            if index == 0 {
                path.push(road.start_intersection);
            }
            path.push(road.end_intersection);
        }
    }
    path
}
