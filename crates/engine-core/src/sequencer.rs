use model::DocumentPlan;

/// Ordered, forward-only iterator over `DocumentPlan`s, mirroring the
/// generator-backed `document_cfg_sequence`/`next_document_configuration`
/// pair in the originating tool. The engine never seeks backward and never
/// skips a plan except by exhausting it.
pub struct PlanSequencer {
    plans: Vec<DocumentPlan>,
    index: usize,
}

impl PlanSequencer {
    pub fn new(plans: Vec<DocumentPlan>) -> Self {
        PlanSequencer { plans, index: 0 }
    }

    pub fn current(&self) -> Option<&DocumentPlan> {
        self.plans.get(self.index)
    }

    pub fn current_mut(&mut self) -> Option<&mut DocumentPlan> {
        self.plans.get_mut(self.index)
    }

    /// The index of the current plan, if any. Callers that need to mutate
    /// a plan after an operation may have advanced the sequencer past it
    /// (e.g. a `fetch` issued between capturing a plan and marking it
    /// migrated) capture this first and use `plan_mut` instead of
    /// `current_mut`.
    pub fn current_index(&self) -> Option<usize> {
        if self.index < self.plans.len() {
            Some(self.index)
        } else {
            None
        }
    }

    /// Mutable access to the plan at a previously captured index,
    /// regardless of where the sequencer's cursor has since moved.
    pub fn plan_mut(&mut self, index: usize) -> Option<&mut DocumentPlan> {
        self.plans.get_mut(index)
    }

    /// Moves to the next plan. A no-op past the end of the list.
    pub fn advance(&mut self) {
        if self.index < self.plans.len() {
            self.index += 1;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.plans.len()
    }

    pub fn plans(&self) -> &[DocumentPlan] {
        &self.plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::FieldQuery;

    fn plan(name: &str) -> DocumentPlan {
        DocumentPlan::new("t", name, vec![] as Vec<FieldQuery>, 50)
    }

    #[test]
    fn empty_plan_list_is_exhausted_immediately() {
        let sequencer = PlanSequencer::new(vec![]);
        assert!(sequencer.is_exhausted());
        assert!(sequencer.current().is_none());
    }

    #[test]
    fn advance_walks_plans_in_order_then_exhausts() {
        let mut sequencer = PlanSequencer::new(vec![plan("a"), plan("b")]);
        assert_eq!(sequencer.current().unwrap().collection_name, "a");

        sequencer.advance();
        assert_eq!(sequencer.current().unwrap().collection_name, "b");

        sequencer.advance();
        assert!(sequencer.is_exhausted());

        sequencer.advance();
        assert!(sequencer.is_exhausted());
    }

    #[test]
    fn plan_mut_reaches_a_plan_after_the_cursor_has_advanced_past_it() {
        let mut sequencer = PlanSequencer::new(vec![plan("a"), plan("b")]);
        let captured = sequencer.current_index().unwrap();

        sequencer.advance();
        assert_eq!(sequencer.current().unwrap().collection_name, "b");

        sequencer.plan_mut(captured).unwrap().num_migrated = 7;
        assert_eq!(sequencer.plans()[captured].num_migrated, 7);
    }
}
