//! Bot decision making.
//!
//! The simulation invokes each live bot's [`AgentController`] once per tick
//! and applies the returned [`AgentAction`] itself, so agents never touch
//! world state directly.

use crate::map::MapGeometry;
use crate::player::PlayerId;
use crate::utils::{angle_difference, bearing, distance, heading};
use rand::{Rng, RngCore};
use shared::{Team, Weapon};

/// Another player as seen by an agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentTarget {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub team: Team,
}

/// Read-only snapshot handed to an agent on every update.
pub struct AgentView<'a> {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub weapon: Weapon,
    pub team: Team,
    /// Living opponents the agent is allowed to engage
    pub targets: &'a [AgentTarget],
    pub map: &'a dyn MapGeometry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgentAction {
    /// Turning speed in degrees per second, positive turns clockwise on screen
    pub turn: f32,
    /// Forward throttle between 0 and 1
    pub forward: f32,
    pub fire: bool,
}

pub trait AgentController: Send {
    fn set_skill(&mut self, level: u8);

    fn update(&mut self, view: &AgentView<'_>, rng: &mut dyn RngCore) -> AgentAction;
}

pub type AgentFactory = Box<dyn Fn() -> Box<dyn AgentController> + Send>;

pub fn default_agent_factory() -> AgentFactory {
    Box::new(|| Box::new(WanderAgent::default()) as Box<dyn AgentController>)
}

const SIGHT_RANGE: f32 = 600.0;
const TURN_SPEED: f32 = 240.0;
const LOOKAHEAD: f32 = 48.0;

/// Roams the map and shoots at the closest visible opponent.
#[derive(Debug, Default)]
pub struct WanderAgent {
    skill: u8,
    /// Current wandering turn, kept for a while to avoid jitter
    drift: f32,
}

impl WanderAgent {
    /// Aim tolerance in degrees; better bots need a tighter line before firing.
    fn aim_tolerance(&self) -> f32 {
        (30.0 - self.skill as f32 * 0.4).max(4.0)
    }

    fn closest_visible<'a>(&self, view: &'a AgentView<'_>) -> Option<&'a AgentTarget> {
        view.targets
            .iter()
            .filter(|t| distance((view.x, view.y), (t.x, t.y)) <= SIGHT_RANGE)
            .filter(|t| !view.map.find_wall(view.x, view.y, t.x, t.y))
            .min_by(|a, b| {
                let da = distance((view.x, view.y), (a.x, a.y));
                let db = distance((view.x, view.y), (b.x, b.y));
                da.total_cmp(&db)
            })
    }
}

impl AgentController for WanderAgent {
    fn set_skill(&mut self, level: u8) {
        self.skill = level;
    }

    fn update(&mut self, view: &AgentView<'_>, rng: &mut dyn RngCore) -> AgentAction {
        if let Some(target) = self.closest_visible(view) {
            let wanted = bearing((view.x, view.y), (target.x, target.y));
            let diff = angle_difference(view.angle, wanted);
            return AgentAction {
                turn: diff.signum() * TURN_SPEED.min(diff.abs() * 10.0),
                forward: 0.5,
                fire: diff.abs() <= self.aim_tolerance(),
            };
        }

        let (dx, dy) = heading(view.angle);
        let blocked = view.map.find_wall(
            view.x,
            view.y,
            view.x + dx * LOOKAHEAD,
            view.y + dy * LOOKAHEAD,
        );
        if blocked || rng.gen_ratio(1, 60) {
            self.drift = if rng.gen_bool(0.5) { TURN_SPEED } else { -TURN_SPEED };
        } else if rng.gen_ratio(1, 20) {
            self.drift = 0.0;
        }

        AgentAction {
            turn: self.drift,
            forward: if blocked { 0.0 } else { 1.0 },
            fire: false,
        }
    }
}
