use std::time::Duration;

use canopy_core::{Command, Coordinate, PointerKind};
use canopy_system_gesture::{
    GestureConfig, GestureMachine, GesturePhase, GestureResolution, Press,
};

const SPOT: Coordinate = Coordinate::new(42.38, -71.09);

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn press(at: u64, kind: PointerKind, over_feature: bool) -> Press {
    Press {
        at: ms(at),
        kind,
        over_feature,
        coordinate: SPOT,
    }
}

fn creation_intents(commands: &[Command]) -> usize {
    commands
        .iter()
        .filter(|command| matches!(command, Command::OpenCreationForm { .. }))
        .count()
}

#[test]
fn release_just_before_the_dwell_creates_nothing() {
    let mut machine = GestureMachine::new(GestureConfig::default());
    let mut commands = Vec::new();

    assert!(machine.pointer_down(press(0, PointerKind::Mouse, false), false, &mut commands));
    assert_eq!(machine.advance(ms(999), &mut commands), None);
    let resolution = machine.pointer_up(ms(999), &mut commands);

    assert_eq!(resolution, Some(GestureResolution::Cancelled));
    assert!(commands.is_empty());
    assert_eq!(machine.phase(), GesturePhase::Idle);
    assert_eq!(machine.advance(ms(5_000), &mut commands), None, "timer died with the press");
}

#[test]
fn sustained_press_emits_exactly_one_intent() {
    let mut machine = GestureMachine::new(GestureConfig::default());
    let mut commands = Vec::new();
    let _ = machine.pointer_down(press(250, PointerKind::Touch, false), false, &mut commands);

    let fired = machine.advance(ms(1_250), &mut commands);
    let _ = machine.advance(ms(1_600), &mut commands);
    let released = machine.pointer_up(ms(2_000), &mut commands);

    assert_eq!(fired, Some(GestureResolution::LongPress { coordinate: SPOT }));
    assert_eq!(released, None);
    assert_eq!(commands, vec![Command::OpenCreationForm { coordinate: SPOT }]);
}

#[test]
fn release_after_the_deadline_fires_before_ending() {
    let mut machine = GestureMachine::new(GestureConfig::default());
    let mut commands = Vec::new();
    let _ = machine.pointer_down(press(0, PointerKind::Mouse, false), false, &mut commands);

    let resolution = machine.pointer_up(ms(1_400), &mut commands);

    assert_eq!(resolution, Some(GestureResolution::LongPress { coordinate: SPOT }));
    assert_eq!(creation_intents(&commands), 1);
}

#[test]
fn press_over_a_feature_never_creates() {
    let mut machine = GestureMachine::new(GestureConfig::default());
    let mut commands = Vec::new();
    let _ = machine.pointer_down(press(0, PointerKind::Mouse, true), true, &mut commands);

    assert_eq!(machine.next_deadline(), None);
    assert_eq!(machine.advance(ms(10_000), &mut commands), None);
    assert_eq!(
        machine.pointer_up(ms(10_000), &mut commands),
        Some(GestureResolution::Tap)
    );
    assert!(commands.is_empty(), "feature presses leave the popup alone");
}

#[test]
fn empty_area_press_dismisses_an_open_popup() {
    let mut machine = GestureMachine::new(GestureConfig::default());
    let mut commands = Vec::new();

    let _ = machine.pointer_down(press(0, PointerKind::Mouse, false), true, &mut commands);

    assert_eq!(commands, vec![Command::ClosePopup]);
    assert_eq!(machine.next_deadline(), Some(ms(1_000)));
}

#[test]
fn touch_cancel_discards_the_pending_timer() {
    let mut machine = GestureMachine::new(GestureConfig::default());
    let mut commands = Vec::new();
    let _ = machine.pointer_down(press(0, PointerKind::Touch, false), false, &mut commands);

    assert_eq!(
        machine.cancel(ms(400), &mut commands),
        Some(GestureResolution::Cancelled)
    );
    assert_eq!(machine.advance(ms(2_000), &mut commands), None);
    assert_eq!(creation_intents(&commands), 0);
}

#[test]
fn second_press_during_a_session_is_ignored() {
    let mut machine = GestureMachine::new(GestureConfig::default());
    let mut commands = Vec::new();
    let _ = machine.pointer_down(press(0, PointerKind::Touch, false), false, &mut commands);

    let accepted = machine.pointer_down(press(500, PointerKind::Mouse, true), false, &mut commands);

    assert!(!accepted);
    let session = machine.session().expect("first press still active");
    assert_eq!(session.kind, PointerKind::Touch);
    assert_eq!(machine.next_deadline(), Some(ms(1_000)));
}

#[test]
fn custom_dwell_is_honoured() {
    let mut machine = GestureMachine::new(GestureConfig { dwell: ms(300) });
    let mut commands = Vec::new();
    let _ = machine.pointer_down(press(0, PointerKind::Mouse, false), false, &mut commands);

    assert!(machine.advance(ms(299), &mut commands).is_none());
    assert!(machine.advance(ms(300), &mut commands).is_some());
}

#[test]
fn escape_dismisses_everything_and_drops_the_press() {
    let mut machine = GestureMachine::new(GestureConfig::default());
    let mut commands = Vec::new();
    let _ = machine.pointer_down(press(0, PointerKind::Mouse, false), false, &mut commands);

    machine.escape(&mut commands);

    assert_eq!(
        commands,
        vec![Command::ClosePopup, Command::DismissCreationForm]
    );
    assert_eq!(machine.phase(), GesturePhase::Idle);
    assert_eq!(machine.advance(ms(2_000), &mut commands), None);
}
