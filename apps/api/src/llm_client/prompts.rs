// Prompt template for resume-vs-job analysis.
// The response contract enforced in `analysis::contract` mirrors the JSON shape requested here.

pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"You are an expert technical recruiter and career coach.
Compare the RESUME against the JOB DESCRIPTION and respond with a single JSON object only.
Do NOT include any text outside the JSON object. Do NOT include explanations or apologies.

The JSON object MUST have exactly these fields:
{
  "matchScore": <integer from 0 to 100: how well the resume fits the job>,
  "missingSkills": [<skills or qualifications the job asks for that the resume lacks>],
  "scoreExplanation": [<2 or 3 short sentences explaining the score>],
  "resumeImprovements": [<exactly 3 concrete, actionable improvements to the resume>],
  "coverLetter": "<a tailored cover letter of 3-4 paragraphs, addressed generically>",
  "interviewQuestions": [<exactly 5 likely interview questions for this candidate and role>]
}

Base every statement on the resume and job description only. Do NOT invent experience.

RESUME:
{resume_text}

JOB DESCRIPTION:
{job_description}
"#;

/// Fills the analysis template.
pub fn build_analysis_prompt(resume_text: &str, job_description: &str) -> String {
    // Job description first so resume text containing the literal placeholder is left untouched.
    ANALYSIS_PROMPT_TEMPLATE
        .replace("{job_description}", job_description)
        .replacen("{resume_text}", resume_text, 1)
}
