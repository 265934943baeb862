use std::fmt;

use super::codec::{
    read_color, read_string, read_u32, read_vec3, write_color, write_string, write_u32,
    write_vec3, DecodeError, EncodeError,
};
use super::dirty::DirtyBits;
use crate::ids::SimId;
use crate::math::{Color, Vec3};

/// Tracked locally, masked out of every encoded message.
const LOCAL_ONLY_BITS: DirtyBits = DirtyBits::BUMPED;

/// One snapshot of the replicated fields of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SimEntityInternals {
    pub position: Vec3,
    /// Euler angles.
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub scale: Vec3,
    pub acceleration: Vec3,
    pub label: String,
    pub color: Color,
    /// Type bitmask used by sensors and collision queries.
    pub entity_type: u32,
    /// Bitmask of the types this entity collides with.
    pub collision: u32,
    pub bumped: bool,
}

impl Default for SimEntityInternals {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            velocity: Vec3::ZERO,
            scale: Vec3::ONE,
            acceleration: Vec3::ZERO,
            label: String::new(),
            color: Color::WHITE,
            entity_type: 0,
            collision: 0,
            bumped: false,
        }
    }
}

/// Replicated, change-tracked state of one simulated entity.
///
/// Holds the live `current` state plus the `previous` state as of the start
/// of the tick. Every setter dirties its field only when the value actually
/// changes, and the dirty mask decides which fields go on the wire.
///
/// Equality is identity: two records are equal when they carry the same
/// valid id. Records with [`SimId::INVALID`] are never equal to anything.
#[derive(Debug, Clone)]
pub struct SimEntityData {
    id: SimId,
    dirty_bits: DirtyBits,
    previous: SimEntityInternals,
    current: SimEntityInternals,
}

impl SimEntityData {
    pub fn new(
        position: Vec3,
        rotation: Vec3,
        scale: Vec3,
        label: impl Into<String>,
        entity_type: u32,
        collision: u32,
        id: SimId,
    ) -> Self {
        let internals = SimEntityInternals {
            position,
            rotation,
            scale,
            label: label.into(),
            entity_type,
            collision,
            ..SimEntityInternals::default()
        };
        Self::from_internals(id, internals)
    }

    /// Default-valued record for `id`, as a client creates on first sight of an entity.
    pub fn with_id(id: SimId) -> Self {
        Self::from_internals(id, SimEntityInternals::default())
    }

    pub fn from_internals(id: SimId, internals: SimEntityInternals) -> Self {
        Self {
            id,
            dirty_bits: DirtyBits::ALL,
            previous: internals.clone(),
            current: internals,
        }
    }

    pub fn id(&self) -> SimId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.current.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.current.rotation
    }

    pub fn velocity(&self) -> Vec3 {
        self.current.velocity
    }

    pub fn scale(&self) -> Vec3 {
        self.current.scale
    }

    pub fn acceleration(&self) -> Vec3 {
        self.current.acceleration
    }

    pub fn label(&self) -> &str {
        &self.current.label
    }

    pub fn color(&self) -> Color {
        self.current.color
    }

    pub fn entity_type(&self) -> u32 {
        self.current.entity_type
    }

    pub fn collision(&self) -> u32 {
        self.current.collision
    }

    pub fn bumped(&self) -> bool {
        self.current.bumped
    }

    pub fn current(&self) -> &SimEntityInternals {
        &self.current
    }

    /// State as of the start of the current tick.
    pub fn previous(&self) -> &SimEntityInternals {
        &self.previous
    }

    pub fn set_position(&mut self, position: Vec3) {
        assign(&mut self.current.position, position, DirtyBits::POSITION, &mut self.dirty_bits);
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        assign(&mut self.current.rotation, rotation, DirtyBits::ROTATION, &mut self.dirty_bits);
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        assign(&mut self.current.velocity, velocity, DirtyBits::VELOCITY, &mut self.dirty_bits);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        assign(&mut self.current.scale, scale, DirtyBits::SCALE, &mut self.dirty_bits);
    }

    pub fn set_acceleration(&mut self, acceleration: Vec3) {
        assign(
            &mut self.current.acceleration,
            acceleration,
            DirtyBits::ACCELERATION,
            &mut self.dirty_bits,
        );
    }

    pub fn set_label(&mut self, label: &str) {
        if self.current.label != label {
            self.current.label = label.to_string();
            self.dirty_bits |= DirtyBits::LABEL;
        }
    }

    pub fn set_color(&mut self, color: Color) {
        assign(&mut self.current.color, color, DirtyBits::COLOR, &mut self.dirty_bits);
    }

    pub fn set_type(&mut self, entity_type: u32) {
        assign(
            &mut self.current.entity_type,
            entity_type,
            DirtyBits::TYPE,
            &mut self.dirty_bits,
        );
    }

    pub fn set_collision(&mut self, collision: u32) {
        assign(
            &mut self.current.collision,
            collision,
            DirtyBits::COLLISION,
            &mut self.dirty_bits,
        );
    }

    pub fn set_bumped(&mut self, bumped: bool) {
        assign(&mut self.current.bumped, bumped, DirtyBits::BUMPED, &mut self.dirty_bits);
    }

    pub fn dirty_bits(&self) -> DirtyBits {
        self.dirty_bits
    }

    pub fn is_dirty(&self, bit: DirtyBits) -> bool {
        self.dirty_bits.intersects(bit)
    }

    /// The dirty bits an encoded message would actually carry.
    pub fn replicated_dirty_bits(&self) -> DirtyBits {
        DirtyBits::from_bits(self.dirty_bits.bits() & !LOCAL_ONLY_BITS.bits())
    }

    /// Call after the pending changes reached every peer.
    pub fn clear_dirty_bits(&mut self) {
        self.dirty_bits = DirtyBits::NONE;
    }

    /// Forces a full resync, e.g. when a new peer joins.
    pub fn mark_all_dirty(&mut self) {
        self.dirty_bits = DirtyBits::ALL;
    }

    /// ORs `bits` into the mask; never clears anything.
    pub fn set_dirty_bits(&mut self, bits: DirtyBits) {
        self.dirty_bits |= bits;
    }

    /// Advances the snapshot: `previous` becomes the current state.
    pub fn process_tick(&mut self, _dt: f32) {
        self.previous.clone_from(&self.current);
    }

    pub fn interpolated_position(&self, frac: f32) -> Vec3 {
        self.previous.position.lerp(self.current.position, frac)
    }

    pub fn interpolated_rotation(&self, frac: f32) -> Vec3 {
        self.previous.rotation.lerp(self.current.rotation, frac)
    }

    /// Appends the update message for the currently dirty fields.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        self.encode_with_bits(self.dirty_bits, out)
    }

    /// Appends an update message carrying exactly the fields selected by `bits`,
    /// independent of what is currently dirty.
    pub fn encode_with_bits(
        &self,
        bits: DirtyBits,
        out: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        let bits = DirtyBits::from_bits(bits.bits() & !LOCAL_ONLY_BITS.bits());
        let start = out.len();
        let state = &self.current;

        // field order must match `decode_from`
        write_u32(out, bits.bits());
        if bits.intersects(DirtyBits::POSITION) {
            write_vec3(out, state.position);
        }
        if bits.intersects(DirtyBits::ROTATION) {
            write_vec3(out, state.rotation);
        }
        if bits.intersects(DirtyBits::VELOCITY) {
            write_vec3(out, state.velocity);
        }
        if bits.intersects(DirtyBits::SCALE) {
            write_vec3(out, state.scale);
        }
        if bits.intersects(DirtyBits::ACCELERATION) {
            write_vec3(out, state.acceleration);
        }
        if bits.intersects(DirtyBits::LABEL) {
            if let Err(error) = write_string(out, &state.label) {
                out.truncate(start);
                return Err(error);
            }
        }
        if bits.intersects(DirtyBits::COLOR) {
            write_color(out, state.color);
        }
        if bits.intersects(DirtyBits::TYPE) {
            write_u32(out, state.entity_type);
        }
        if bits.intersects(DirtyBits::COLLISION) {
            write_u32(out, state.collision);
        }
        Ok(())
    }

    /// Applies one update message that must span all of `bytes`.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<DirtyBits, DecodeError> {
        let mut cursor = 0usize;
        let incoming = self.decode_from(bytes, &mut cursor)?;
        if cursor != bytes.len() {
            return Err(DecodeError::TrailingBytes {
                count: bytes.len() - cursor,
            });
        }
        Ok(incoming)
    }

    /// Applies one update message starting at `cursor` and returns the incoming bits.
    ///
    /// Only fields flagged in the incoming mask are read. The incoming mask is
    /// ORed into this record's dirty bits. On error neither the state, the
    /// dirty bits nor `cursor` change.
    pub fn decode_from(
        &mut self,
        bytes: &[u8],
        cursor: &mut usize,
    ) -> Result<DirtyBits, DecodeError> {
        let mut local = *cursor;
        let incoming = DirtyBits::from_bits(read_u32(bytes, &mut local, "dirty_bits")?);
        let mut staged = self.current.clone();

        if incoming.intersects(DirtyBits::POSITION) {
            staged.position = read_vec3(bytes, &mut local, "position")?;
        }
        if incoming.intersects(DirtyBits::ROTATION) {
            staged.rotation = read_vec3(bytes, &mut local, "rotation")?;
        }
        if incoming.intersects(DirtyBits::VELOCITY) {
            staged.velocity = read_vec3(bytes, &mut local, "velocity")?;
        }
        if incoming.intersects(DirtyBits::SCALE) {
            staged.scale = read_vec3(bytes, &mut local, "scale")?;
        }
        if incoming.intersects(DirtyBits::ACCELERATION) {
            staged.acceleration = read_vec3(bytes, &mut local, "acceleration")?;
        }
        if incoming.intersects(DirtyBits::LABEL) {
            staged.label = read_string(bytes, &mut local, "label")?;
        }
        if incoming.intersects(DirtyBits::COLOR) {
            staged.color = read_color(bytes, &mut local, "color")?;
        }
        if incoming.intersects(DirtyBits::TYPE) {
            staged.entity_type = read_u32(bytes, &mut local, "type")?;
        }
        if incoming.intersects(DirtyBits::COLLISION) {
            staged.collision = read_u32(bytes, &mut local, "collision")?;
        }

        self.current = staged;
        self.dirty_bits |= incoming;
        *cursor = local;
        Ok(incoming)
    }
}

fn assign<T: PartialEq>(slot: &mut T, value: T, bit: DirtyBits, dirty_bits: &mut DirtyBits) {
    if *slot != value {
        *slot = value;
        *dirty_bits |= bit;
    }
}

impl PartialEq for SimEntityData {
    fn eq(&self, other: &Self) -> bool {
        self.id.is_valid() && self.id == other.id
    }
}

impl fmt::Display for SimEntityData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{id: {}, position: {}, rotation: {}, velocity: {}, scale: {}}}",
            self.id,
            self.current.position,
            self.current.rotation,
            self.current.velocity,
            self.current.scale
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: u32) -> SimEntityData {
        SimEntityData::new(
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ONE,
            "agent",
            0b01,
            0b10,
            SimId(id),
        )
    }

    #[test]
    fn construction_marks_everything_dirty() {
        let data = sample(1);
        assert_eq!(data.dirty_bits(), DirtyBits::ALL);
        assert_eq!(data.color(), Color::WHITE);
        assert_eq!(data.velocity(), Vec3::ZERO);
        assert_eq!(data.previous(), data.current());
    }

    #[test]
    fn setting_the_same_value_does_not_dirty() {
        let mut data = sample(1);
        data.clear_dirty_bits();
        assert_eq!(data.dirty_bits(), DirtyBits::NONE);

        data.set_position(Vec3::ZERO);
        data.set_rotation(Vec3::ZERO);
        data.set_velocity(Vec3::ZERO);
        data.set_scale(Vec3::ONE);
        data.set_acceleration(Vec3::ZERO);
        data.set_label("agent");
        data.set_color(Color::WHITE);
        data.set_type(0b01);
        data.set_collision(0b10);
        data.set_bumped(false);
        assert_eq!(data.dirty_bits(), DirtyBits::NONE);

        let heading = Vec3::new(0.0, 1.5, 0.0);
        data.set_rotation(heading);
        data.set_velocity(heading);
        data.set_acceleration(heading);
        data.clear_dirty_bits();
        data.set_rotation(heading);
        data.set_velocity(heading);
        data.set_acceleration(heading);
        assert_eq!(data.dirty_bits(), DirtyBits::NONE);
    }

    #[test]
    fn setting_a_new_value_dirties_exactly_that_field() {
        let mut data = sample(1);
        data.clear_dirty_bits();

        data.set_position(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(data.dirty_bits(), DirtyBits::POSITION);
        assert_eq!(data.position(), Vec3::new(1.0, 0.0, 0.0));

        data.clear_dirty_bits();
        data.set_position(Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(data.dirty_bits(), DirtyBits::POSITION);
    }

    #[test]
    fn bits_accumulate_until_cleared() {
        let mut data = sample(1);
        data.clear_dirty_bits();

        data.set_velocity(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(data.dirty_bits(), DirtyBits::VELOCITY);
        data.set_position(Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(data.dirty_bits(), DirtyBits::POSITION | DirtyBits::VELOCITY);
        assert!(data.is_dirty(DirtyBits::VELOCITY));
        assert!(!data.is_dirty(DirtyBits::LABEL));
    }

    #[test]
    fn set_dirty_bits_merges_and_mark_all_forces_full_resync() {
        let mut data = sample(1);
        data.clear_dirty_bits();
        data.set_label("renamed");
        data.set_dirty_bits(DirtyBits::COLOR);
        assert_eq!(data.dirty_bits(), DirtyBits::LABEL | DirtyBits::COLOR);

        data.mark_all_dirty();
        assert_eq!(data.dirty_bits(), DirtyBits::ALL);
    }

    #[test]
    fn process_tick_moves_current_into_previous_without_clearing_bits() {
        let mut data = sample(1);
        data.clear_dirty_bits();
        data.set_position(Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(data.previous().position, Vec3::ZERO);

        data.process_tick(0.016);
        assert_eq!(data.previous().position, Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(data.dirty_bits(), DirtyBits::POSITION);
    }

    #[test]
    fn interpolation_runs_from_previous_to_current() {
        let mut data = sample(1);
        data.set_position(Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(data.interpolated_position(0.5), Vec3::new(1.0, 0.0, 0.0));
        data.process_tick(0.016);
        assert_eq!(data.interpolated_position(0.5), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn equality_is_by_valid_id_only() {
        let mut a = sample(7);
        let b = sample(7);
        a.set_label("different");
        assert_eq!(a, b);
        assert_ne!(sample(7), sample(8));
        assert_ne!(
            SimEntityData::with_id(SimId::INVALID),
            SimEntityData::with_id(SimId::INVALID)
        );
    }

    #[test]
    fn round_trip_copies_only_dirty_fields() {
        let mut source = sample(3);
        source.clear_dirty_bits();
        source.set_position(Vec3::new(1.0, 2.0, 3.0));
        source.set_label("scout");
        source.set_collision(0xF0);
        source.set_rotation(Vec3::new(0.0, 90.0, 0.0));
        let mut bytes = Vec::new();
        source.encode(&mut bytes).expect("encode");

        let mut receiver = SimEntityData::with_id(SimId(3));
        receiver.clear_dirty_bits();
        receiver.set_dirty_bits(DirtyBits::SCALE);
        receiver.set_velocity(Vec3::new(9.0, 9.0, 9.0));
        let before_bits = receiver.dirty_bits();

        let incoming = receiver.decode(&bytes).expect("decode");
        assert_eq!(
            incoming,
            DirtyBits::POSITION | DirtyBits::ROTATION | DirtyBits::LABEL | DirtyBits::COLLISION
        );
        assert_eq!(receiver.dirty_bits(), before_bits | incoming);
        assert_eq!(receiver.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(receiver.rotation(), Vec3::new(0.0, 90.0, 0.0));
        assert_eq!(receiver.label(), "scout");
        assert_eq!(receiver.collision(), 0xF0);
        assert_eq!(receiver.velocity(), Vec3::new(9.0, 9.0, 9.0));
        assert_eq!(receiver.scale(), Vec3::ONE);
        assert_eq!(receiver.entity_type(), 0);
    }

    #[test]
    fn encoding_follows_the_fixed_field_order() {
        let mut source = sample(1);
        source.clear_dirty_bits();
        source.set_type(0x55);
        source.set_position(Vec3::new(1.0, 0.0, 0.0));
        let mut bytes = Vec::new();
        source.encode(&mut bytes).expect("encode");

        let expected_bits = (DirtyBits::POSITION | DirtyBits::TYPE).bits();
        assert_eq!(bytes.len(), 4 + 12 + 4);
        assert_eq!(&bytes[0..4], &expected_bits.to_le_bytes());
        assert_eq!(&bytes[4..8], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &0x55u32.to_le_bytes());
    }

    #[test]
    fn bumped_bit_never_reaches_the_wire() {
        let mut source = sample(1);
        source.clear_dirty_bits();
        source.set_bumped(true);
        assert_eq!(source.dirty_bits(), DirtyBits::BUMPED);

        let mut bytes = Vec::new();
        source.encode(&mut bytes).expect("encode");
        assert_eq!(bytes, 0u32.to_le_bytes().to_vec());
    }

    #[test]
    fn full_state_message_reproduces_every_field() {
        let mut source = sample(5);
        source.set_color(Color::rgba(1, 2, 3, 4));
        source.set_acceleration(Vec3::new(0.0, -9.8, 0.0));
        let mut bytes = Vec::new();
        source.encode(&mut bytes).expect("encode");

        let mut receiver = SimEntityData::with_id(SimId(5));
        receiver.decode(&bytes).expect("decode");
        assert_eq!(receiver.current(), source.current());
    }

    #[test]
    fn truncated_message_leaves_receiver_untouched() {
        let mut source = sample(1);
        source.clear_dirty_bits();
        source.set_position(Vec3::new(5.0, 5.0, 5.0));
        source.set_label("long enough label");
        let mut bytes = Vec::new();
        source.encode(&mut bytes).expect("encode");
        bytes.truncate(bytes.len() - 3);

        let mut receiver = SimEntityData::with_id(SimId(1));
        receiver.clear_dirty_bits();
        let mut cursor = 0usize;
        let error = receiver
            .decode_from(&bytes, &mut cursor)
            .expect_err("truncated");
        assert!(matches!(error, DecodeError::Truncated { field: "label", .. }));
        assert_eq!(cursor, 0);
        assert_eq!(receiver.position(), Vec3::ZERO);
        assert_eq!(receiver.dirty_bits(), DirtyBits::NONE);
    }

    #[test]
    fn trailing_bytes_are_rejected_by_whole_message_decode() {
        let mut source = sample(1);
        source.clear_dirty_bits();
        let mut bytes = Vec::new();
        source.encode(&mut bytes).expect("encode");
        bytes.push(0xAB);

        let mut receiver = SimEntityData::with_id(SimId(1));
        assert_eq!(
            receiver.decode(&bytes),
            Err(DecodeError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn display_lists_id_and_pose() {
        let data = sample(9);
        assert_eq!(
            data.to_string(),
            "{id: 9, position: (0, 0, 0), rotation: (0, 0, 0), velocity: (0, 0, 0), scale: (1, 1, 1)}"
        );
    }
}
