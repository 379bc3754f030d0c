//! 预约账本
//!
//! 所有对预约的“读取-修改-写入”都在按顾问划分的互斥区内完成，外部协作方调用
//! （日历、会议）一律放在互斥区之外。互斥锁不可重入，持锁的辅助函数不得再次加锁。

use std::sync::Arc;
use std::time::Duration;

use config::BookingPolicy;
use domain::{
    Booking, BookingFilter, BookingId, BookingState, CancelActor, ContactEmail, CounsellorId,
    DomainError, PaymentHandle, Slot, StudentContact, StudentId, TimeRange, Timestamp,
    Transition,
};
use tokio::sync::OwnedMutexGuard;

use crate::{
    clock::Clock,
    collaborators::{call_with_timeout, Calendar, MeetingProvider},
    error::{ApplicationError, ApplicationResult},
    locks::KeyedLocks,
    notifications::BookingNotifier,
    repository::BookingRepository,
    services::directory_service::DirectoryService,
};

#[derive(Debug, Clone)]
pub struct CreateBookingRequest {
    pub counsellor_id: String,
    /// 学生标识；未登录时为邮箱
    pub student_id: String,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub student_whatsapp: Option<String>,
    pub slot_start: Timestamp,
}

pub struct BookingLedgerDependencies {
    pub booking_repository: Arc<dyn BookingRepository>,
    pub directory: Arc<DirectoryService>,
    pub calendar: Arc<dyn Calendar>,
    pub meetings: Arc<dyn MeetingProvider>,
    pub notifier: Arc<dyn BookingNotifier>,
    pub clock: Arc<dyn Clock>,
    pub policy: BookingPolicy,
    pub collaborator_timeout: Duration,
}

pub struct BookingLedger {
    deps: BookingLedgerDependencies,
    locks: KeyedLocks<CounsellorId>,
}

impl BookingLedger {
    pub fn new(deps: BookingLedgerDependencies) -> Self {
        Self {
            deps,
            locks: KeyedLocks::new(),
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.deps.policy
    }

    pub async fn create(&self, request: CreateBookingRequest) -> ApplicationResult<Booking> {
        let counsellor_id = CounsellorId::parse(request.counsellor_id)?;
        let student_id = StudentId::parse(request.student_id)?;
        let contact = parse_contact(
            request.student_name,
            request.student_email,
            request.student_whatsapp,
        )?;

        let counsellor = self.deps.directory.require_active(&counsellor_id).await?;
        let slot = Slot::new(
            counsellor_id.clone(),
            request.slot_start,
            self.deps.policy.session_minutes,
        )?;
        if slot.start <= self.deps.clock.now() {
            return Err(DomainError::invalid_argument("slot_start", "must be in the future").into());
        }

        let range = slot.range();
        let busy = call_with_timeout(
            "calendar",
            self.deps.collaborator_timeout,
            self.deps.calendar.busy_ranges(
                &counsellor_id,
                &counsellor.external_scheduling_ref,
                range,
            ),
        )
        .await
        .map_err(|err| ApplicationError::CalendarUnavailable(err.to_string()))?;
        if busy.iter().any(|b| b.overlaps(&range)) {
            tracing::info!(counsellor_id = %counsellor_id, start = %slot.start, "slot busy in external calendar");
            return Err(DomainError::SlotConflict.into());
        }

        let _guard = self.locks.acquire(&counsellor_id).await;
        let now = self.deps.clock.now();
        let bookings = self.expire_overdue_locked(&counsellor_id, now).await?;
        if bookings.iter().any(|b| b.conflicts_with(&range, now)) {
            tracing::info!(counsellor_id = %counsellor_id, start = %slot.start, "slot already held");
            return Err(DomainError::SlotConflict.into());
        }
        if let Some(cap) = self.deps.policy.max_pending_per_student {
            self.ensure_pending_capacity(&student_id, cap, now).await?;
        }

        let booking = Booking::new_pending(
            BookingId::generate(),
            student_id,
            contact,
            slot,
            now,
            chrono::Duration::minutes(i64::from(self.deps.policy.payment_window_minutes)),
        )?;
        let stored = self.deps.booking_repository.insert(booking).await?;
        tracing::info!(
            booking_id = %stored.id,
            counsellor_id = %stored.counsellor_id,
            start = %stored.slot.start,
            expires_at = %stored.expires_at,
            "booking created"
        );
        Ok(stored)
    }

    /// 确认支付成功的预约。同一支付凭证重复确认返回 `Transition::Unchanged`，
    /// 不会再次创建会议或发送通知。
    pub async fn confirm(
        &self,
        booking_id: BookingId,
        payment_ref: &PaymentHandle,
    ) -> ApplicationResult<(Booking, Transition)> {
        let (guard, mut booking) = self.lock_booking(booking_id).await?;
        let now = self.deps.clock.now();

        if booking.expire(now).applied() {
            self.deps.booking_repository.update(booking.clone()).await?;
            tracing::info!(booking_id = %booking.id, "payment arrived after expiry");
            return Err(DomainError::Expired.into());
        }
        if booking.state == BookingState::PendingPayment {
            let range = booking.range();
            let taken = self
                .deps
                .booking_repository
                .list_for_counsellor(&booking.counsellor_id)
                .await?
                .iter()
                .any(|other| {
                    other.id != booking.id
                        && other.state == BookingState::Confirmed
                        && other.range().overlaps(&range)
                });
            if taken {
                return Err(DomainError::SlotConflict.into());
            }
        }

        let transition = booking.confirm(payment_ref, now)?;
        if !transition.applied() {
            return Ok((booking, transition));
        }
        let booking = self.deps.booking_repository.update(booking).await?;
        drop(guard);
        tracing::info!(booking_id = %booking.id, payment_ref = %payment_ref, "booking confirmed");

        let booking = self.provision_meeting(booking).await?;
        self.deps.notifier.notify_confirmed(&booking);
        Ok((booking, transition))
    }

    /// 在互斥区外创建会议，再用一次短暂的加锁写入会议链接。
    /// 会议创建失败时预约保持已确认、无链接，等待后台重试。
    async fn provision_meeting(&self, booking: Booking) -> ApplicationResult<Booking> {
        let meeting = call_with_timeout(
            "meeting provider",
            self.deps.collaborator_timeout,
            self.deps.meetings.create_meeting(booking.id),
        )
        .await;
        let meeting_ref = match meeting {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(booking_id = %booking.id, error = %err, "meeting creation failed, will retry");
                return Ok(booking);
            }
        };

        let (_guard, mut current) = self.lock_booking(booking.id).await?;
        if current
            .attach_meeting(meeting_ref, self.deps.clock.now())
            .applied()
        {
            current = self.deps.booking_repository.update(current).await?;
            tracing::info!(booking_id = %current.id, "meeting link attached");
        }
        Ok(current)
    }

    /// 为已确认但缺少会议链接的预约补建会议，返回补建成功的数量。
    pub async fn retry_missing_meetings(&self) -> ApplicationResult<usize> {
        let pending = self
            .deps
            .booking_repository
            .list_in_state(BookingState::Confirmed)
            .await?;
        let mut attached = 0;
        for booking in pending.into_iter().filter(|b| b.needs_meeting()) {
            let updated = self.provision_meeting(booking).await?;
            if updated.meeting_ref.is_some() {
                self.deps.notifier.notify_meeting_ready(&updated);
                attached += 1;
            }
        }
        Ok(attached)
    }

    /// 幂等：只有超过支付窗口的待支付预约会变为过期，其余情况原样返回。
    pub async fn expire(&self, booking_id: BookingId) -> ApplicationResult<Booking> {
        let (_guard, mut booking) = self.lock_booking(booking_id).await?;
        if booking.expire(self.deps.clock.now()).applied() {
            booking = self.deps.booking_repository.update(booking).await?;
            tracing::info!(booking_id = %booking.id, "booking expired");
        }
        Ok(booking)
    }

    /// 清理所有超时未支付的预约，返回过期的数量。
    pub async fn expire_overdue(&self) -> ApplicationResult<usize> {
        let now = self.deps.clock.now();
        let mut counsellors: Vec<CounsellorId> = self
            .deps
            .booking_repository
            .list_in_state(BookingState::PendingPayment)
            .await?
            .into_iter()
            .filter(|b| b.is_overdue(now))
            .map(|b| b.counsellor_id)
            .collect();
        counsellors.sort();
        counsellors.dedup();

        let mut expired = 0;
        for counsellor_id in counsellors {
            expired += self.expire_overdue_for(&counsellor_id).await?;
        }
        Ok(expired)
    }

    pub async fn expire_overdue_for(&self, counsellor_id: &CounsellorId) -> ApplicationResult<usize> {
        let _guard = self.locks.acquire(counsellor_id).await;
        let now = self.deps.clock.now();
        let before = self
            .deps
            .booking_repository
            .list_for_counsellor(counsellor_id)
            .await?
            .iter()
            .filter(|b| b.is_overdue(now))
            .count();
        self.expire_overdue_locked(counsellor_id, now).await?;
        Ok(before)
    }

    /// 顾问当前被本系统占用的时间段（待支付未过期或已确认），顺带清理过期预约。
    pub async fn active_ranges(&self, counsellor_id: &CounsellorId) -> ApplicationResult<Vec<TimeRange>> {
        let _guard = self.locks.acquire(counsellor_id).await;
        let now = self.deps.clock.now();
        Ok(self
            .expire_overdue_locked(counsellor_id, now)
            .await?
            .iter()
            .filter(|b| b.holds_slot(now))
            .map(|b| b.range())
            .collect())
    }

    pub async fn cancel(
        &self,
        booking_id: BookingId,
        actor: CancelActor,
        reason: Option<String>,
    ) -> ApplicationResult<Booking> {
        let (_guard, mut booking) = self.lock_booking(booking_id).await?;
        let now = self.deps.clock.now();
        if booking.expire(now).applied() {
            self.deps.booking_repository.update(booking.clone()).await?;
            return Err(DomainError::invalid_state(booking.state, "cancel").into());
        }
        booking.cancel(actor, reason, now, self.cancellation_window())?;
        let booking = self.deps.booking_repository.update(booking).await?;
        tracing::info!(booking_id = %booking.id, actor = ?actor, "booking cancelled");
        Ok(booking)
    }

    /// 支付失败时释放仍在等待支付的预约。已确认、已过期或已取消的预约，
    /// 以及当前支付凭证不是 `payment_ref` 的预约保持不变。
    pub async fn cancel_unpaid(
        &self,
        booking_id: BookingId,
        payment_ref: &PaymentHandle,
        reason: &str,
    ) -> ApplicationResult<(Booking, Transition)> {
        let (_guard, mut booking) = self.lock_booking(booking_id).await?;
        let now = self.deps.clock.now();
        if booking.expire(now).applied() {
            let booking = self.deps.booking_repository.update(booking).await?;
            return Ok((booking, Transition::Unchanged));
        }
        if booking.state != BookingState::PendingPayment
            || booking.payment_ref.as_ref() != Some(payment_ref)
        {
            return Ok((booking, Transition::Unchanged));
        }
        booking.cancel(
            CancelActor::System,
            Some(reason.to_owned()),
            now,
            self.cancellation_window(),
        )?;
        let booking = self.deps.booking_repository.update(booking).await?;
        tracing::info!(booking_id = %booking.id, reason, "unpaid booking cancelled");
        Ok((booking, Transition::Applied))
    }

    pub async fn complete(&self, booking_id: BookingId) -> ApplicationResult<Booking> {
        let (_guard, mut booking) = self.lock_booking(booking_id).await?;
        if booking.complete(self.deps.clock.now())?.applied() {
            booking = self.deps.booking_repository.update(booking).await?;
            tracing::info!(booking_id = %booking.id, "booking completed");
        }
        Ok(booking)
    }

    /// 将所有已结束的已确认预约标记为完成，返回数量。
    pub async fn complete_due(&self) -> ApplicationResult<usize> {
        let now = self.deps.clock.now();
        let mut counsellors: Vec<CounsellorId> = self
            .deps
            .booking_repository
            .list_in_state(BookingState::Confirmed)
            .await?
            .into_iter()
            .filter(|b| b.slot.end() <= now)
            .map(|b| b.counsellor_id)
            .collect();
        counsellors.sort();
        counsellors.dedup();

        let mut completed = 0;
        for counsellor_id in counsellors {
            completed += self.complete_due_for(&counsellor_id).await?;
        }
        Ok(completed)
    }

    pub async fn complete_due_for(&self, counsellor_id: &CounsellorId) -> ApplicationResult<usize> {
        let _guard = self.locks.acquire(counsellor_id).await;
        let now = self.deps.clock.now();
        let mut completed = 0;
        for mut booking in self
            .deps
            .booking_repository
            .list_for_counsellor(counsellor_id)
            .await?
        {
            if booking.state != BookingState::Confirmed || booking.slot.end() > now {
                continue;
            }
            if booking.complete(now)?.applied() {
                tracing::info!(booking_id = %booking.id, "booking completed");
                self.deps.booking_repository.update(booking).await?;
                completed += 1;
            }
        }
        Ok(completed)
    }

    pub async fn get_booking(&self, booking_id: BookingId) -> ApplicationResult<Booking> {
        let booking = self.find(booking_id).await?;
        if booking.is_overdue(self.deps.clock.now()) {
            return self.expire(booking_id).await;
        }
        Ok(booking)
    }

    /// 按开始时间排序；超时未支付的预约在返回前被标记为过期。
    pub async fn list_bookings(&self, filter: BookingFilter) -> ApplicationResult<Vec<Booking>> {
        let now = self.deps.clock.now();
        let mut bookings = Vec::new();
        for booking in self.deps.booking_repository.list(filter.clone()).await? {
            let booking = if booking.is_overdue(now) {
                self.expire(booking.id).await?
            } else {
                booking
            };
            if filter.matches(&booking) {
                bookings.push(booking);
            }
        }
        Ok(bookings)
    }

    /// 发起支付前的检查：必须仍在等待支付且未超时。
    pub async fn ensure_payable(&self, booking_id: BookingId) -> ApplicationResult<Booking> {
        let (_guard, mut booking) = self.lock_booking(booking_id).await?;
        if booking.expire(self.deps.clock.now()).applied() {
            self.deps.booking_repository.update(booking).await?;
            return Err(DomainError::Expired.into());
        }
        if booking.state != BookingState::PendingPayment {
            return Err(DomainError::invalid_state(booking.state, "pay for").into());
        }
        Ok(booking)
    }

    pub async fn attach_payment(
        &self,
        booking_id: BookingId,
        handle: PaymentHandle,
    ) -> ApplicationResult<Booking> {
        let (_guard, mut booking) = self.lock_booking(booking_id).await?;
        let now = self.deps.clock.now();
        if booking.expire(now).applied() {
            self.deps.booking_repository.update(booking).await?;
            return Err(DomainError::Expired.into());
        }
        booking.attach_payment(handle, now)?;
        Ok(self.deps.booking_repository.update(booking).await?)
    }

    async fn find(&self, booking_id: BookingId) -> ApplicationResult<Booking> {
        self.deps
            .booking_repository
            .find_by_id(booking_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::BookingNotFound))
    }

    /// 获取预约所属顾问的锁，并在锁内重新读取预约。
    async fn lock_booking(
        &self,
        booking_id: BookingId,
    ) -> ApplicationResult<(OwnedMutexGuard<()>, Booking)> {
        let counsellor_id = self.find(booking_id).await?.counsellor_id;
        let guard = self.locks.acquire(&counsellor_id).await;
        let booking = self.find(booking_id).await?;
        Ok((guard, booking))
    }

    /// 调用方必须已持有该顾问的锁。
    async fn expire_overdue_locked(
        &self,
        counsellor_id: &CounsellorId,
        now: Timestamp,
    ) -> ApplicationResult<Vec<Booking>> {
        let mut bookings = self
            .deps
            .booking_repository
            .list_for_counsellor(counsellor_id)
            .await?;
        for booking in bookings.iter_mut() {
            if booking.expire(now).applied() {
                self.deps.booking_repository.update(booking.clone()).await?;
                tracing::info!(booking_id = %booking.id, "booking expired");
            }
        }
        Ok(bookings)
    }

    async fn ensure_pending_capacity(
        &self,
        student_id: &StudentId,
        cap: u32,
        now: Timestamp,
    ) -> ApplicationResult<()> {
        let filter = BookingFilter {
            student_id: Some(student_id.clone()),
            state: Some(BookingState::PendingPayment),
            ..Default::default()
        };
        let pending = self
            .deps
            .booking_repository
            .list(filter)
            .await?
            .iter()
            .filter(|b| !b.is_overdue(now))
            .count();
        if pending >= cap as usize {
            return Err(DomainError::PendingLimitReached.into());
        }
        Ok(())
    }

    fn cancellation_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.deps.policy.cancellation_window_minutes))
    }
}

fn parse_contact(
    name: Option<String>,
    email: Option<String>,
    whatsapp: Option<String>,
) -> ApplicationResult<StudentContact> {
    let non_empty = |value: Option<String>| {
        value
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    };
    let email = match non_empty(email) {
        Some(email) => Some(ContactEmail::parse(email)?),
        None => None,
    };
    Ok(StudentContact {
        name: non_empty(name),
        email,
        whatsapp: non_empty(whatsapp),
    })
}
