//! Avatar pose derivation.
//!
//! [`render`] is a pure function of emotion, activity flags, pointer
//! offset and blink state. The only moving parts live outside it: the
//! [`BlinkTimer`] and the [`PointerTracker`].

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::emotion::Emotion;

const POINTER_DIVISOR: f32 = 18.0;
const MAX_PITCH: f32 = 15.0;
const MAX_YAW: f32 = 20.0;
const EYE_Y: f32 = 95.0;
const LEFT_EYE_X: f32 = 85.0;
const RIGHT_EYE_X: f32 = 115.0;

const BLINK_BASE: Duration = Duration::from_millis(3500);
const BLINK_JITTER_MS: u64 = 2000;
const BLINK_CLOSED: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PointerOffset {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Drawing area of [`to_svg`], in its own units.
pub const AVATAR_BOX: BoundingBox = BoundingBox { left: 0.0, top: 0.0, width: 200.0, height: 200.0 };

impl PointerOffset {
    /// Offset of a pointer from the centre of `bbox`, scaled down for parallax.
    pub fn from_client(client_x: f32, client_y: f32, bbox: BoundingBox) -> Self {
        Self {
            x: (client_x - bbox.left - bbox.width / 2.0) / POINTER_DIVISOR,
            y: (client_y - bbox.top - bbox.height / 2.0) / POINTER_DIVISOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AvatarInput {
    pub emotion: Emotion,
    pub loading: bool,
    pub streaming: bool,
    pub pointer: PointerOffset,
    pub blinking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadPose {
    pub rotate_x: f32,
    pub rotate_y: f32,
    pub rotate_z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub skin_light: &'static str,
    pub skin_dark: &'static str,
    pub skin_edge: &'static str,
    pub robe: &'static str,
    pub robe_highlight: &'static str,
}

pub const CALM_PALETTE: Palette = Palette {
    skin_light: "#ffedd5",
    skin_dark: "#fdba74",
    skin_edge: "#fb923c",
    robe: "#065f46",
    robe_highlight: "#10b981",
};

pub const ANGRY_PALETTE: Palette = Palette {
    skin_light: "#fee2e2",
    skin_dark: "#fca5a5",
    skin_edge: "#ef4444",
    robe: "#7f1d1d",
    robe_highlight: "#b91c1c",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn eye_x(self) -> f32 {
        match self {
            Side::Left => LEFT_EYE_X,
            Side::Right => RIGHT_EYE_X,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Eye {
    /// `^` shaped arc.
    HappyArc { cx: f32 },
    /// `u` shaped arc.
    SadArc { cx: f32 },
    Open { cx: f32, scale_y: f32, pupil_x: f32, pupil_y: f32, pupil_radius: f32 },
}

impl Eye {
    pub fn arc_path(&self) -> Option<String> {
        match *self {
            Eye::HappyArc { cx } => Some(format!("M{},{EYE_Y} Q{cx},85 {},{EYE_Y}", cx - 8.0, cx + 8.0)),
            Eye::SadArc { cx } => Some(format!("M{},{EYE_Y} Q{cx},100 {},{EYE_Y}", cx - 8.0, cx + 8.0)),
            Eye::Open { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mouth {
    Speaking,
    Thinking,
    Smile,
    Frown,
    Gasp,
    Neutral,
}

impl Mouth {
    pub fn path(&self) -> &'static str {
        match self {
            Mouth::Speaking => "M92,125 Q100,135 108,125 Q100,115 92,125",
            Mouth::Thinking => "M95,128 Q100,125 105,128",
            Mouth::Smile => "M90,125 Q100,135 110,125",
            Mouth::Frown => "M90,130 Q100,120 110,130",
            Mouth::Gasp => "M95,125 Q100,140 105,125",
            Mouth::Neutral => "M92,128 Q100,130 108,128",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Eyebrows {
    pub rotate: f32,
    pub offset_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdleAnimation {
    Meditate,
    Think,
    Shake,
}

impl IdleAnimation {
    pub fn name(&self) -> &'static str {
        match self {
            IdleAnimation::Meditate => "meditate",
            IdleAnimation::Think => "think",
            IdleAnimation::Shake => "shake",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AvatarPose {
    pub emotion: Emotion,
    pub head: HeadPose,
    pub palette: Palette,
    pub eyes: [Eye; 2],
    pub mouth: Mouth,
    pub eyebrows: Eyebrows,
    pub wrinkles: bool,
    pub glow: &'static str,
    pub animation: IdleAnimation,
}

pub fn render(input: &AvatarInput) -> AvatarPose {
    let AvatarInput { emotion, loading, streaming, pointer, blinking } = *input;
    let angry = emotion == Emotion::Angry;

    let head = if loading {
        // The shake animation owns the roll while angry.
        HeadPose { rotate_x: -8.0, rotate_y: 5.0, rotate_z: if angry { 0.0 } else { -2.0 } }
    } else {
        HeadPose {
            rotate_x: (-pointer.y).clamp(-MAX_PITCH, MAX_PITCH),
            rotate_y: pointer.x.clamp(-MAX_YAW, MAX_YAW),
            rotate_z: match emotion {
                Emotion::Happy => 5.0,
                Emotion::Sad => -5.0,
                _ => 0.0,
            },
        }
    };

    let eye = |side: Side| -> Eye {
        let cx = side.eye_x();
        match emotion {
            Emotion::Happy => Eye::HappyArc { cx },
            Emotion::Sad => Eye::SadArc { cx },
            _ => {
                let scale_y = match emotion {
                    Emotion::Surprised => 1.3,
                    Emotion::Angry => 0.8,
                    _ if blinking => 0.1,
                    _ => 1.0,
                };
                let (pupil_x, pupil_y) = if loading {
                    (if side == Side::Left { -1.0 } else { 1.0 }, 4.0)
                } else {
                    (pointer.x / 3.0, pointer.y / 3.0)
                };
                let pupil_radius = if emotion == Emotion::Surprised { 2.0 } else { 3.5 };
                Eye::Open { cx, scale_y, pupil_x, pupil_y, pupil_radius }
            }
        }
    };

    let mouth = if streaming {
        Mouth::Speaking
    } else if loading {
        Mouth::Thinking
    } else {
        match emotion {
            Emotion::Happy => Mouth::Smile,
            Emotion::Angry => Mouth::Frown,
            Emotion::Surprised => Mouth::Gasp,
            _ => Mouth::Neutral,
        }
    };

    let eyebrows = if loading {
        Eyebrows { rotate: 5.0, offset_y: -3.0 }
    } else {
        match emotion {
            Emotion::Angry => Eyebrows { rotate: 20.0, offset_y: 5.0 },
            Emotion::Sad => Eyebrows { rotate: -15.0, offset_y: -2.0 },
            Emotion::Surprised => Eyebrows { rotate: 0.0, offset_y: -8.0 },
            _ => Eyebrows { rotate: 0.0, offset_y: 0.0 },
        }
    };

    let animation = if loading {
        IdleAnimation::Think
    } else if angry {
        IdleAnimation::Shake
    } else {
        IdleAnimation::Meditate
    };

    AvatarPose {
        emotion,
        head,
        palette: if angry { ANGRY_PALETTE } else { CALM_PALETTE },
        eyes: [eye(Side::Left), eye(Side::Right)],
        mouth,
        eyebrows,
        wrinkles: angry || emotion == Emotion::Sad || loading,
        glow: match emotion {
            Emotion::Angry => "#ef4444",
            Emotion::Happy => "#fcd34d",
            _ => "#6ee7b7",
        },
        animation,
    }
}

pub fn blink_suppressed(emotion: Emotion, loading: bool) -> bool {
    loading || matches!(emotion, Emotion::Surprised | Emotion::Angry)
}

/// Involuntary blinking on a jittered interval.
pub struct BlinkTimer {
    rng: StdRng,
    next_blink: Instant,
    open_at: Option<Instant>,
}

impl BlinkTimer {
    pub fn new(now: Instant) -> Self {
        Self::with_rng(now, StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn seeded(now: Instant, seed: u64) -> Self {
        Self::with_rng(now, StdRng::seed_from_u64(seed))
    }

    fn with_rng(now: Instant, mut rng: StdRng) -> Self {
        let next_blink = now + Self::interval(&mut rng);
        Self { rng, next_blink, open_at: None }
    }

    fn interval(rng: &mut StdRng) -> Duration {
        BLINK_BASE + Duration::from_millis(rng.gen_range(0..BLINK_JITTER_MS))
    }

    /// Whether the eyes are closed at `now`. A due blink is skipped, not
    /// postponed, while `suppressed`.
    pub fn is_closed(&mut self, now: Instant, suppressed: bool) -> bool {
        if let Some(open_at) = self.open_at {
            if now < open_at {
                return true;
            }
            self.open_at = None;
        }
        if now >= self.next_blink {
            self.next_blink = now + Self::interval(&mut self.rng);
            if !suppressed {
                self.open_at = Some(now + BLINK_CLOSED);
                return true;
            }
        }
        false
    }
}

/// Follows the pointer with exponential smoothing.
#[derive(Debug, Clone, Copy)]
pub struct PointerTracker {
    current: PointerOffset,
    smoothing: f32,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self { current: PointerOffset::default(), smoothing: 0.35 }
    }
}

impl PointerTracker {
    pub fn current(&self) -> PointerOffset {
        self.current
    }

    pub fn update(&mut self, target: PointerOffset) -> PointerOffset {
        self.current.x += (target.x - self.current.x) * self.smoothing;
        self.current.y += (target.y - self.current.y) * self.smoothing;
        self.current
    }

    pub fn settle(&mut self, target: PointerOffset) {
        self.current = target;
    }
}

/// One-line face for terminals.
pub fn terminal_face(pose: &AvatarPose) -> String {
    let eye = match pose.eyes[0] {
        Eye::HappyArc { .. } => "^",
        Eye::SadArc { .. } => "T",
        Eye::Open { scale_y, .. } if scale_y < 0.5 => "-",
        Eye::Open { pupil_radius, .. } if pupil_radius < 3.0 => "O",
        Eye::Open { .. } if pose.emotion == Emotion::Angry => "ò",
        Eye::Open { .. } => "•",
    };
    let right_eye = if eye == "ò" { "ó" } else { eye };
    let mouth = match pose.mouth {
        Mouth::Speaking => "o",
        Mouth::Thinking => "~",
        Mouth::Smile => "‿",
        Mouth::Frown => "︿",
        Mouth::Gasp => "□",
        Mouth::Neutral => "_",
    };
    let (open, close) = match pose.animation {
        IdleAnimation::Think => ("(", ")…"),
        IdleAnimation::Shake => ("ヽ(", ")ノ"),
        IdleAnimation::Meditate => ("(", ")"),
    };
    format!("{open}{eye}{mouth}{right_eye}{close}")
}

/// Standalone SVG drawing of a pose.
pub fn to_svg(pose: &AvatarPose) -> String {
    let p = pose.palette;
    let h = pose.head;
    let mut svg = String::new();
    let _ = write!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 200" data-animation="{anim}">
<defs>
<radialGradient id="skin" cx="30%" cy="30%" r="80%"><stop offset="0%" stop-color="{sl}"/><stop offset="60%" stop-color="{sd}"/><stop offset="100%" stop-color="{se}"/></radialGradient>
<radialGradient id="robe" cx="70%" cy="30%" r="90%"><stop offset="0%" stop-color="{rh}"/><stop offset="70%" stop-color="{r}"/><stop offset="100%" stop-color="#022c22"/></radialGradient>
</defs>
<circle cx="100" cy="100" r="70" fill="{glow}" opacity="0.4"/>
<g transform="translate(100, 170)"><path d="M-40,0 Q-50,-50 0,-60 Q50,-50 40,0 Z" fill="url(#robe)"/><path d="M-20,-50 L0,-30 L20,-50" fill="none" stroke="white" stroke-width="4" opacity="0.8"/></g>
<g transform="rotate({rz} 100 100) translate({tx} {ty})">
<circle cx="100" cy="100" r="38" fill="url(#skin)"/>
<path d="M70,110 Q100,175 130,110" fill="#f1f5f9"/>
"##,
        anim = pose.animation.name(),
        sl = p.skin_light,
        sd = p.skin_dark,
        se = p.skin_edge,
        rh = p.robe_highlight,
        r = p.robe,
        glow = pose.glow,
        rz = h.rotate_z,
        tx = h.rotate_y / 4.0,
        ty = -h.rotate_x / 4.0,
    );
    for (eye, side) in pose.eyes.iter().zip([-1.0f32, 1.0]) {
        let brow_x = 100.0 + side * 15.0;
        let _ = writeln!(
            svg,
            r##"<path d="M{},80 L{},80" stroke="#e2e8f0" stroke-width="4" stroke-linecap="round" transform="translate(0 {}) rotate({} {brow_x} 80)"/>"##,
            brow_x - 8.0,
            brow_x + 8.0,
            pose.eyebrows.offset_y,
            pose.eyebrows.rotate * side,
        );
        match *eye {
            Eye::Open { cx, scale_y, pupil_x, pupil_y, pupil_radius } => {
                let _ = writeln!(
                    svg,
                    r##"<g transform="translate({cx}, {EYE_Y}) scale(1, {scale_y})"><circle r="8" fill="white"/><circle cx="{pupil_x}" cy="{pupil_y}" r="{pupil_radius}" fill="#1e293b"/></g>"##
                );
            }
            _ => {
                if let Some(d) = eye.arc_path() {
                    let _ = writeln!(svg, r##"<path d="{d}" fill="none" stroke="#1e293b" stroke-width="3" stroke-linecap="round"/>"##);
                }
            }
        }
    }
    if pose.wrinkles {
        svg.push_str(r##"<path d="M88,72 Q100,68 112,72" fill="none" stroke="#9a3412" stroke-width="1" opacity="0.5"/>"##);
        svg.push('\n');
    }
    let _ = writeln!(svg, r##"<path d="{}" fill="#7c2d12" stroke="#7c2d12" stroke-width="2"/>"##, pose.mouth.path());
    svg.push_str("</g>\n</svg>\n");
    svg
}
