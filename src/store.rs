//! Concurrent in-memory document store.
//!
//! Every mutation is a single-document update under a `DashMap` shard guard.
//! The one multi-document write, linking a new carpool group to its members,
//! goes through a reservation protocol: members are claimed one by one with
//! [`Store::try_reserve`] and [`Store::commit_group`] only links bookings still
//! held by the same attempt, restoring any already-linked member on failure.
//! No guard is ever held while another map (or another entry of the same map)
//! is touched.

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Booking, BookingStatus, CarpoolGroup, GroupStatus, User};

#[derive(Debug, Default)]
pub struct Store {
    users: DashMap<Uuid, User>,
    bookings: DashMap<Uuid, Booking>,
    groups: DashMap<Uuid, CarpoolGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMember {
    pub booking: Booking,
    pub user: Option<User>,
}

/// A group with its member bookings and their owners looked up.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedGroup {
    pub group: CarpoolGroup,
    pub members: Vec<ResolvedMember>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.users.len(), self.bookings.len(), self.groups.len())
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn user(&self, id: &Uuid) -> Result<User, AppError> {
        self.users
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    /// Applies `update` to a user in place and returns the updated copy.
    pub fn update_user<F>(&self, id: &Uuid, update: F) -> Result<User, AppError>
    where
        F: FnOnce(&mut User),
    {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
        update(user.value_mut());
        Ok(user.clone())
    }

    pub fn insert_booking(&self, booking: Booking) {
        self.bookings.insert(booking.id, booking);
    }

    pub fn booking(&self, id: &Uuid) -> Result<Booking, AppError> {
        self.bookings
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))
    }

    /// Runs `update` against a booking under its write guard. The closure may
    /// refuse the change by returning an error, leaving the booking untouched.
    pub fn update_booking<F>(&self, id: &Uuid, update: F) -> Result<Booking, AppError>
    where
        F: FnOnce(&mut Booking) -> Result<(), AppError>,
    {
        let mut booking = self
            .bookings
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;
        update(booking.value_mut())?;
        Ok(booking.clone())
    }

    pub fn group(&self, id: &Uuid) -> Result<CarpoolGroup, AppError> {
        self.groups
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("carpool group {id} not found")))
    }

    /// Same contract as [`Store::update_booking`], for groups.
    pub fn update_group<F>(&self, id: &Uuid, update: F) -> Result<CarpoolGroup, AppError>
    where
        F: FnOnce(&mut CarpoolGroup) -> Result<(), AppError>,
    {
        let mut group = self
            .groups
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("carpool group {id} not found")))?;
        update(group.value_mut())?;
        Ok(group.clone())
    }

    /// Bookings a new carpool request may be grouped with, oldest first.
    pub fn carpool_candidates(&self, exclude: &Uuid, limit: usize) -> Vec<Booking> {
        let mut candidates: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| {
                let booking = entry.value();
                &booking.id != exclude && booking.is_poolable() && booking.destination.is_some()
            })
            .map(|entry| entry.value().clone())
            .collect();

        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        candidates.truncate(limit);
        candidates
    }

    /// Ungrouped carpool bookings still waiting for partners, oldest first.
    pub fn pending_carpool_bookings(&self) -> Vec<Booking> {
        let mut pending: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| entry.value().is_poolable())
            .map(|entry| entry.value().clone())
            .collect();

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending
    }

    /// Atomically claims a poolable booking for one grouping attempt.
    pub fn try_reserve(&self, booking_id: &Uuid, attempt_id: Uuid) -> bool {
        match self.bookings.get_mut(booking_id) {
            Some(mut booking) if booking.is_poolable() => {
                booking.reserved_by = Some(attempt_id);
                true
            }
            _ => false,
        }
    }

    pub fn release(&self, booking_id: &Uuid, attempt_id: Uuid) {
        if let Some(mut booking) = self.bookings.get_mut(booking_id) {
            if booking.reserved_by == Some(attempt_id) {
                booking.reserved_by = None;
            }
        }
    }

    /// Links every member to `group` and then publishes the group. All members
    /// must still be reserved by `attempt_id`; otherwise nothing is linked.
    pub fn commit_group(&self, group: CarpoolGroup, attempt_id: Uuid) -> Result<CarpoolGroup, AppError> {
        let mut linked: Vec<Uuid> = Vec::with_capacity(group.bookings.len());
        let mut failure = None;

        for booking_id in &group.bookings {
            let Some(fare) = group.split_fares.get(booking_id).copied() else {
                failure = Some(format!("no fare share computed for booking {booking_id}"));
                break;
            };

            match self.bookings.get_mut(booking_id) {
                Some(mut booking)
                    if booking.reserved_by == Some(attempt_id)
                        && booking.status == BookingStatus::Requested =>
                {
                    booking.carpool_group = Some(group.id);
                    booking.passenger_fare = Some(fare);
                    booking.reserved_by = None;
                    linked.push(*booking_id);
                }
                Some(_) => {
                    failure = Some(format!("booking {booking_id} is no longer held by this attempt"));
                    break;
                }
                None => {
                    failure = Some(format!("booking {booking_id} disappeared"));
                    break;
                }
            }
        }

        if let Some(reason) = failure {
            for booking_id in &linked {
                if let Some(mut booking) = self.bookings.get_mut(booking_id) {
                    booking.carpool_group = None;
                    booking.passenger_fare = None;
                }
            }
            for booking_id in &group.bookings {
                self.release(booking_id, attempt_id);
            }
            return Err(AppError::GroupPersistence(reason));
        }

        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub fn open_groups(&self) -> Vec<ResolvedGroup> {
        let mut open: Vec<CarpoolGroup> = self
            .groups
            .iter()
            .filter(|entry| entry.value().status == GroupStatus::Open)
            .map(|entry| entry.value().clone())
            .collect();

        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        open.into_iter().map(|group| self.resolve(group)).collect()
    }

    pub fn resolve(&self, group: CarpoolGroup) -> ResolvedGroup {
        let members = group
            .bookings
            .iter()
            .filter_map(|id| self.booking(id).ok())
            .map(|booking| {
                let user = self.user(&booking.user_id).ok();
                ResolvedMember { booking, user }
            })
            .collect();

        ResolvedGroup { group, members }
    }

    pub fn count_pending(&self) -> usize {
        self.bookings
            .iter()
            .filter(|entry| entry.value().is_poolable())
            .count()
    }

    pub fn count_open_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|entry| entry.value().status == GroupStatus::Open)
            .count()
    }

    /// Applies a status to every member booking, returning the ids that changed.
    pub fn cascade_status(&self, booking_ids: &[Uuid], status: BookingStatus) -> Vec<Uuid> {
        let mut changed = Vec::with_capacity(booking_ids.len());
        for booking_id in booking_ids {
            if let Some(mut booking) = self.bookings.get_mut(booking_id) {
                if booking.status != status {
                    booking.status = status;
                    changed.push(*booking_id);
                }
            }
        }
        changed
    }
}
