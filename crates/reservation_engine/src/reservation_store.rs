use crate::types::Reservation;

/// Local mirror of the requester's confirmed reservations.
///
/// Keyed by reservation identifier; insertion order is kept and in-place
/// replacement keeps an entry's original position. Reservations without an
/// identifier are never confirmed and are ignored.
#[derive(Debug, Clone, Default)]
pub struct ReservationStore {
    reservations: Vec<Reservation>,
}

impl ReservationStore {
    /// Creates an empty mirror
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry with the same identifier in place, or appends it
    pub fn upsert(&mut self, reservation: Reservation) {
        let Some(id) = reservation.id.as_deref() else {
            return;
        };

        match self
            .reservations
            .iter()
            .position(|existing| existing.id.as_deref() == Some(id))
        {
            Some(index) => self.reservations[index] = reservation,
            None => self.reservations.push(reservation),
        }
    }

    /// Removes the entry with this identifier; unknown identifiers are a no-op
    pub fn remove(&mut self, id: &str) -> Option<Reservation> {
        let index = self
            .reservations
            .iter()
            .position(|existing| existing.id.as_deref() == Some(id))?;
        Some(self.reservations.remove(index))
    }

    /// Reservations in mirror order
    pub fn list(&self) -> &[Reservation] {
        &self.reservations
    }

    /// Looks up one reservation
    pub fn get(&self, id: &str) -> Option<&Reservation> {
        self.reservations
            .iter()
            .find(|existing| existing.id.as_deref() == Some(id))
    }

    /// Upserts every reservation of a server listing, in listing order
    pub fn sync(&mut self, reservations: impl IntoIterator<Item = Reservation>) {
        for reservation in reservations {
            self.upsert(reservation);
        }
    }

    /// Drops everything, e.g. on sign-out
    pub fn clear(&mut self) {
        self.reservations.clear();
    }

    /// Number of reservations
    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    /// Whether the mirror is empty
    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}
