// Crumble - Temperature and humidity readings from DHT22 sensors
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use std::io;

/// Control over the OS scheduling policy of the calling thread.
///
/// Used to ask for real-time priority while the timing sensitive part of a
/// sensor read is happening so that we're less likely to be preempted in the
/// middle of measuring a pulse.
pub trait Scheduler {
    fn elevate(&self) -> io::Result<()>;
    fn restore(&self) -> io::Result<()>;
}

/// Switch the calling thread between `SCHED_FIFO` at maximum priority and the
/// default `SCHED_OTHER` policy. Elevation requires root or `CAP_SYS_NICE`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealtimeScheduler;

#[cfg(target_os = "linux")]
impl RealtimeScheduler {
    fn set_policy(policy: libc::c_int, priority: libc::c_int) -> io::Result<()> {
        // Zeroed first since some libc targets have extra fields in sched_param.
        let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
        param.sched_priority = priority;

        // A pid of 0 applies the policy to the calling thread only.
        let res = unsafe { libc::sched_setscheduler(0, policy, &param) };
        if res == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(target_os = "linux")]
impl Scheduler for RealtimeScheduler {
    fn elevate(&self) -> io::Result<()> {
        let max = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
        if max == -1 {
            return Err(io::Error::last_os_error());
        }

        Self::set_policy(libc::SCHED_FIFO, max)
    }

    fn restore(&self) -> io::Result<()> {
        Self::set_policy(libc::SCHED_OTHER, 0)
    }
}

#[cfg(not(target_os = "linux"))]
impl Scheduler for RealtimeScheduler {
    fn elevate(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "real-time scheduling is only supported on Linux",
        ))
    }

    fn restore(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Scheduler that leaves the calling thread at normal priority.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalScheduler;

impl Scheduler for NormalScheduler {
    fn elevate(&self) -> io::Result<()> {
        Ok(())
    }

    fn restore(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Restores normal scheduling when dropped, including when unwinding.
struct PriorityGuard<'a> {
    scheduler: &'a dyn Scheduler,
}

impl<'a> PriorityGuard<'a> {
    fn elevate(scheduler: &'a dyn Scheduler) -> Self {
        if let Err(e) = scheduler.elevate() {
            tracing::debug!(message = "unable to elevate scheduling priority, reading at normal priority", error = %e);
        }

        Self { scheduler }
    }
}

impl<'a> Drop for PriorityGuard<'a> {
    fn drop(&mut self) {
        if let Err(e) = self.scheduler.restore() {
            tracing::warn!(message = "unable to restore normal scheduling priority", error = %e);
        }
    }
}

/// Run `f` with the calling thread at elevated scheduling priority.
///
/// Failing to elevate priority is not an error, `f` still runs. Restoring
/// normal priority is always attempted once `f` returns, whatever it returned.
pub fn with_elevated_priority<T, F>(scheduler: &dyn Scheduler, f: F) -> T
where
    F: FnOnce() -> T,
{
    let _guard = PriorityGuard::elevate(scheduler);
    f()
}
