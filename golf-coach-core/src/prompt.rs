use crate::models::{AnnotationContext, HistoryContext, SwingPosition};

/// Label block sent ahead of each image so the model knows which phase it sees.
pub fn position_label(position: SwingPosition) -> String {
    format!("[{} POSITION]", position.as_str().to_uppercase())
}

/// Build the instruction text that follows the images.
pub fn build_analysis_prompt(
    positions: &[SwingPosition],
    annotations: &AnnotationContext,
    history: &[HistoryContext],
) -> String {
    let positions_str = positions
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "You are an expert golf instructor analyzing swing images. I'm providing {} image(s) \
         showing the following swing position(s): {}.\n",
        positions.len(),
        positions_str
    );

    if !annotations.is_empty() {
        prompt.push_str(&shot_context_block(annotations));
    }

    if !history.is_empty() {
        prompt.push_str(&history_block(history));
    }

    prompt.push_str(&format!(
        r#"
Please provide a comprehensive analysis with the following structure:

1. OVERALL ASSESSMENT
   - Rate the swing quality on a scale of 1-10
   - Provide a 2-3 sentence summary of the overall swing

2. POSITION ANALYSIS
   For each image provided ({positions_str}), analyze:
   - Key observations (posture, alignment, club position, body mechanics)
   - What's being done well
   - What needs improvement

3. SPECIFIC ISSUES
   List 2-4 specific technical problems in order of priority (most important first)

4. RECOMMENDATIONS
   Provide 3-4 actionable drills or changes to improve the swing

Please be specific, constructive, and focus on the most impactful improvements. Format your response clearly with headers for each section."#
    ));

    prompt
}

fn shot_context_block(annotations: &AnnotationContext) -> String {
    let mut block = String::from("\nSHOT CONTEXT (provided by the golfer):\n");
    let fields = [
        ("Club", &annotations.club),
        ("Shot outcome", &annotations.shot_outcome),
        ("Working on", &annotations.focus_area),
        ("Notes", &annotations.notes),
    ];
    for (label, value) in fields {
        if let Some(v) = value {
            block.push_str(&format!("- {}: {}\n", label, v));
        }
    }
    block.push_str(
        "Relate your analysis to this context: explain which swing faults could produce the \
         stated shot outcome and give feedback on the stated focus area.\n",
    );
    block
}

fn history_block(history: &[HistoryContext]) -> String {
    let mut block = String::from("\nRECENT SWING HISTORY (most recent first):\n");
    for (i, h) in history.iter().enumerate() {
        let rating = h
            .rating
            .map(|r| format!("{}/10", r))
            .unwrap_or_else(|| "unrated".to_string());
        block.push_str(&format!(
            "{}. {} | rating {} | club: {} | outcome: {}\n",
            i + 1,
            h.created_at.format("%Y-%m-%d"),
            rating,
            h.club.as_deref().unwrap_or("unknown"),
            h.shot_outcome.as_deref().unwrap_or("unknown"),
        ));
        if let Some(summary) = &h.summary {
            block.push_str(&format!("   Summary: {}\n", summary));
        }
    }
    block.push_str(
        "Compare this swing with the history above and comment on progress or recurring issues.\n",
    );
    block
}
