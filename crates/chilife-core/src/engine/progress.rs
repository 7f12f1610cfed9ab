#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

/// Receives the objective value after every minimizer iteration.
pub trait MinimizationObserver: Sync {
    fn on_iteration(&self, objective: f64, iteration: usize);
}

impl<F> MinimizationObserver for F
where
    F: Fn(f64, usize) + Sync,
{
    fn on_iteration(&self, objective: f64, iteration: usize) {
        self(objective, iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_is_silent() {
        let reporter = ProgressReporter::new();
        reporter.report(Progress::Message("ignored".to_string()));
    }

    #[test]
    fn reporter_forwards_events_to_callback() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::TaskStart { total_steps } = event {
                seen.lock().unwrap().push(total_steps);
            }
        }));
        reporter.report(Progress::TaskStart { total_steps: 7 });
        reporter.report(Progress::TaskIncrement);
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec![7]);
    }

    #[test]
    fn closures_act_as_minimization_observers() {
        let values = Mutex::new(Vec::new());
        let observer = |objective: f64, iteration: usize| {
            values.lock().unwrap().push((iteration, objective));
        };
        observer.on_iteration(2.5, 0);
        observer.on_iteration(1.5, 1);
        assert_eq!(values.into_inner().unwrap(), vec![(0, 2.5), (1, 1.5)]);
    }
}
