/// Append-only textual record of one episode, fed back to the decision provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trajectory {
    text: String,
    blocks: usize,
}

const BLOCK_SEPARATOR: &str = "\n\n----------------------\n\n";

impl Trajectory {
    pub fn new(instruction: &str) -> Self {
        Self {
            text: format!("Task:\n{instruction}"),
            blocks: 0,
        }
    }

    pub fn append(&mut self, reflection: &str, plan: &str) {
        self.text.push_str("\n\nReflection:\n");
        self.text.push_str(reflection);
        self.text.push_str(BLOCK_SEPARATOR);
        self.text.push_str("Plan:\n");
        self.text.push_str(plan);
        self.blocks += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of reflection/plan blocks appended so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_with_instruction() {
        let traj = Trajectory::new("open the settings");
        assert_eq!(traj.as_str(), "Task:\nopen the settings");
        assert_eq!(traj.blocks(), 0);
    }

    #[test]
    fn blocks_append_in_order_and_keep_prefix() {
        let mut traj = Trajectory::new("t");
        traj.append("r1", "p1");
        let after_one = traj.as_str().to_string();
        traj.append("r2", "p2");

        assert!(traj.as_str().starts_with(&after_one));
        assert_eq!(
            traj.as_str(),
            "Task:\nt\
             \n\nReflection:\nr1\n\n----------------------\n\nPlan:\np1\
             \n\nReflection:\nr2\n\n----------------------\n\nPlan:\np2"
        );
        assert_eq!(traj.blocks(), 2);
    }
}
