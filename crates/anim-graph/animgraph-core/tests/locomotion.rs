use std::sync::Arc;

use animgraph_core::{
    Graph, GraphConfig, GraphDataSet, GraphDefinition, GraphEventType, GraphInstance, KeyframeClip,
    Skeleton, Transform, TransitionPhase,
};
use animgraph_test_fixtures::{clips, graphs, skeletons};
use anyhow::Result;
use approx::assert_relative_eq;

// Node indices in fixtures/graphs/locomotion.json.
const LOCOMOTION_SM: usize = 19;
const IDLE: usize = 8;
const WALK: usize = 10;
const IDLE_TO_WALK: usize = 13;
const WALK_TO_RUN: usize = 15;
const RUN: usize = 12;
const WAVE_SM: usize = 27;
const WAVE_OFF: usize = 22;
const WAVE_ON: usize = 23;

fn data_set(graph: &str) -> Result<GraphDataSet> {
    let skeleton_json = skeletons::json(&graphs::skeleton(graph)?)?;
    let skeleton = Arc::new(Skeleton::from_json(&skeleton_json)?);
    let mut data_set = GraphDataSet::new(Arc::clone(&skeleton));
    for clip in graphs::clips(graph)? {
        let clip = KeyframeClip::from_json(&clips::json(&clip)?, &skeleton)?;
        data_set = data_set.with_animation(Arc::new(clip));
    }
    Ok(data_set)
}

fn locomotion_graph() -> Result<Arc<Graph>> {
    Ok(Graph::from_json(&graphs::json("locomotion")?, data_set("locomotion")?)?)
}

fn locomotion(config: GraphConfig) -> Result<GraphInstance> {
    Ok(GraphInstance::new(locomotion_graph()?, config)?)
}

fn has_graph_event(instance: &GraphInstance, event_type: GraphEventType, id: &str) -> bool {
    instance
        .sampled_events()
        .iter()
        .any(|e| e.graph_event() == Some((event_type, id)))
}

#[test]
fn starts_idle_without_root_motion() -> Result<()> {
    let mut inst = locomotion(GraphConfig::default())?;
    inst.update(1.0 / 30.0);
    assert_eq!(inst.active_state_index(LOCOMOTION_SM), Some(0));
    assert_eq!(inst.active_state_index(WAVE_SM), Some(0));
    assert_eq!(inst.root_motion_delta(), Transform::IDENTITY);
    assert!(has_graph_event(&inst, GraphEventType::Entry, "idle"));
    Ok(())
}

#[test]
fn speed_blends_from_idle_into_walk() -> Result<()> {
    let mut inst = locomotion(GraphConfig::default())?;
    inst.update(0.1);
    inst.set_float("speed", 1.0)?;

    inst.update(0.1);
    assert_eq!(inst.active_state_index(LOCOMOTION_SM), Some(1));
    assert_eq!(inst.transition_progress(IDLE_TO_WALK), Some(0.0));
    assert_eq!(inst.state_phase(IDLE), Some(TransitionPhase::TransitioningOut));
    assert_eq!(inst.state_phase(WALK), Some(TransitionPhase::TransitioningIn));
    assert!(has_graph_event(&inst, GraphEventType::Entry, "walk"));

    let mut last = 0.0;
    for _ in 0..2 {
        inst.update(0.1);
        let progress = inst.transition_progress(IDLE_TO_WALK).unwrap();
        assert!(progress > last);
        last = progress;
    }

    // The 0.25s blend is over; walk plays on its own and moves the root 1.2 units per second.
    inst.update(0.1);
    assert_eq!(inst.transition_progress(IDLE_TO_WALK), None);
    assert_eq!(inst.state_phase(WALK), Some(TransitionPhase::None));
    inst.update(0.1);
    assert_relative_eq!(inst.root_motion_delta().translation.x, 0.12, epsilon = 1e-4);
    Ok(())
}

#[test]
fn fast_speed_reaches_run() -> Result<()> {
    let mut inst = locomotion(GraphConfig::default())?;
    inst.set_float("speed", 1.0)?;
    for _ in 0..5 {
        inst.update(0.1);
    }
    assert_eq!(inst.active_state_index(LOCOMOTION_SM), Some(1));

    inst.set_float("speed", 3.0)?;
    inst.update(0.1);
    assert_eq!(inst.active_state_index(LOCOMOTION_SM), Some(2));
    assert!(inst.transition_progress(WALK_TO_RUN).is_some());
    assert!(has_graph_event(&inst, GraphEventType::Exit, "walk_end"));

    for _ in 0..10 {
        inst.update(0.1);
    }
    assert_eq!(inst.transition_progress(WALK_TO_RUN), None);
    assert!(has_graph_event(&inst, GraphEventType::FullyInState, "running"));
    Ok(())
}

fn settle(inst: &mut GraphInstance) {
    for _ in 0..8 {
        inst.update(0.1);
    }
}

fn assert_settled(inst: &GraphInstance, states: &[usize]) {
    for &state in states {
        assert_eq!(inst.state_phase(state), Some(TransitionPhase::None), "state node {state}");
    }
}

#[test]
fn states_can_be_revisited() -> Result<()> {
    let mut inst = locomotion(GraphConfig::default())?;
    inst.update(0.1);

    // idle -> walk -> idle -> walk -> run -> walk, each blend left to finish.
    for (speed, expected) in [(1.0, 1), (0.0, 0), (1.0, 1), (3.0, 2), (1.0, 1)] {
        inst.set_float("speed", speed)?;
        inst.update(0.1);
        assert_eq!(inst.active_state_index(LOCOMOTION_SM), Some(expected), "speed {speed}");
        settle(&mut inst);
        assert_settled(&inst, &[IDLE, WALK, RUN]);
    }

    for (wave, expected) in [(true, 1), (false, 0), (true, 1)] {
        inst.set_bool("wave", wave)?;
        inst.update(0.1);
        assert_eq!(inst.active_state_index(WAVE_SM), Some(expected), "wave {wave}");
        settle(&mut inst);
        assert_settled(&inst, &[WAVE_OFF, WAVE_ON]);
    }
    Ok(())
}

#[test]
fn wave_layer_only_moves_the_upper_body() -> Result<()> {
    let graph = locomotion_graph()?;
    let mut plain = GraphInstance::new(Arc::clone(&graph), GraphConfig::default())?;
    let mut waving = GraphInstance::new(Arc::clone(&graph), GraphConfig::default())?;
    assert_eq!(Arc::strong_count(&graph), 3);

    waving.set_bool("wave", true)?;
    waving.update(0.1);
    plain.update(0.1);
    assert!(has_graph_event(&waving, GraphEventType::Entry, "wave_start"));
    for _ in 0..5 {
        plain.update(0.1);
        waving.update(0.1);
    }
    assert_eq!(waving.active_state_index(WAVE_SM), Some(1));

    let (a, b) = (plain.output_pose(), waving.output_pose());
    // Pelvis is outside the upper body mask.
    assert_eq!(a.transform(1), b.transform(1));
    let hand = 4;
    assert!((b.transform(hand).translation.y - a.transform(hand).translation.y).abs() > 0.1);
    Ok(())
}

#[test]
fn eager_and_lazy_model_space_match_exactly() -> Result<()> {
    let mut lazy = locomotion(GraphConfig::default())?;
    let mut eager = locomotion(GraphConfig {
        calculate_model_space_pose: true,
        ..Default::default()
    })?;
    for inst in [&mut lazy, &mut eager] {
        inst.set_float("speed", 1.0)?;
        inst.set_bool("wave", true)?;
        for _ in 0..7 {
            inst.update(0.05);
        }
    }

    let eager_pose = eager.output_pose();
    let model = eager_pose.model_space_transforms().unwrap();
    for (bone, transform) in model.iter().enumerate() {
        assert_eq!(*transform, lazy.output_pose().get_model_space_transform(bone));
    }
    Ok(())
}

#[test]
fn definition_survives_a_json_round_trip() -> Result<()> {
    let definition: GraphDefinition = graphs::load("locomotion")?;
    let json = serde_json::to_string(&definition)?;
    let graph = Graph::from_json(&json, data_set("locomotion")?)?;
    assert_eq!(graph.num_nodes(), definition.nodes.len());
    assert_eq!(graph.id(), "locomotion");
    Ok(())
}

#[test]
fn sampled_events_are_capped() -> Result<()> {
    let mut inst = locomotion(GraphConfig {
        max_sampled_events: 1,
        ..Default::default()
    })?;
    inst.set_float("speed", 1.0)?;
    inst.update(0.1);
    assert_eq!(inst.sampled_events().len(), 1);
    Ok(())
}
