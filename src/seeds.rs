//! Built-in questions so the server is useful without a configured question bank.

use serde_json::json;

use crate::domain::Question;
use crate::error::TieResult;

const REVERSE_WORDS_STARTER_PYTHON: &str = "def reverseWords(s):\n    return \"\"\n";

const REVERSE_WORDS_AUXILIARY_PYTHON: &str = "\
class AuxiliaryCode(object):
    @classmethod
    def reverseCharacters(cls, s):
        return s[::-1]

    @classmethod
    def returnInput(cls, s):
        return s

    @classmethod
    def reverseWordsCollapsingSpaces(cls, s):
        return ' '.join(reversed(s.split()))
";

/// Minimal set of built-in questions. Configured questions with the same id win.
pub fn seed_questions() -> TieResult<Vec<Question>> {
  let reverse_words: Question = serde_json::from_value(json!({
    "id": "reverseWords",
    "title": "Reverse Words",
    "starterCode": { "python": REVERSE_WORDS_STARTER_PYTHON },
    "auxiliaryCode": { "python": REVERSE_WORDS_AUXILIARY_PYTHON },
    "tasks": [
      {
        "id": "reverseWordsTask1",
        "instructions": [
          { "content": "Write a function that reverses the order of the words in a sentence. Words are separated by single spaces.", "type": "text" },
          { "content": "Input: \"hello world\"\nOutput: \"world hello\"", "type": "code" },
        ],
        "prerequisiteSkills": ["String Manipulation"],
        "acquiredSkills": ["String Manipulation"],
        "mainFunctionName": "reverseWords",
        "testSuites": [
          {
            "id": "GENERAL",
            "humanReadableName": "typical sentences",
            "testCases": [
              { "input": "hello world", "allowedOutputs": ["world hello"] },
              { "input": "the quick brown fox", "allowedOutputs": ["fox brown quick the"] },
              { "input": "abc def", "allowedOutputs": ["def abc"] },
            ],
          },
          {
            "id": "EDGE",
            "humanReadableName": "empty and single-word sentences",
            "testCases": [
              { "input": "", "allowedOutputs": [""] },
              { "input": "single", "allowedOutputs": ["single"] },
            ],
          },
        ],
        "buggyOutputTests": [
          {
            "buggyFunctionName": "AuxiliaryCode.reverseCharacters",
            "messages": [
              "Take a close look at what your output looks like for \"hello world\". Is every character in the right place?",
              "It looks like you're reversing the characters of the sentence, not the words.",
              "Try splitting the sentence into words first, and then reversing the order of those words.",
            ],
          },
          {
            "buggyFunctionName": "AuxiliaryCode.returnInput",
            "ignoredTestSuiteIds": ["EDGE"],
            "messages": [
              "Your function seems to return its input unchanged. Did you forget to return the reversed sentence?",
            ],
          },
        ],
        "suiteLevelTests": [
          {
            "testSuiteIdsThatMustPass": ["GENERAL"],
            "testSuiteIdsThatMustFail": ["EDGE"],
            "messages": [
              "Your code works for typical sentences. What happens when the sentence is empty or has only one word?",
            ],
          },
        ],
        "languageSpecificTips": {
          "python": [
            {
              "regexString": "\\bwhile\\b",
              "message": "You don't need an explicit loop here. Python strings and lists come with methods that can do most of the work.",
            },
          ],
        },
      },
      {
        "id": "reverseWordsTask2",
        "instructions": [
          { "content": "Now sentences may contain runs of several spaces. Keep every space where it is, and reverse only the words.", "type": "text" },
          { "content": "Input: \"a  b\"\nOutput: \"b  a\"", "type": "code" },
        ],
        "prerequisiteSkills": ["String Manipulation"],
        "acquiredSkills": ["String Manipulation", "Arrays"],
        "mainFunctionName": "reverseWords",
        "testSuites": [
          {
            "id": "SPACES",
            "humanReadableName": "sentences with repeated spaces",
            "testCases": [
              { "input": "a  b", "allowedOutputs": ["b  a"] },
              { "input": "x y  z", "allowedOutputs": ["z  y x"] },
              { "input": "  lead", "allowedOutputs": ["lead  "] },
            ],
          },
        ],
        "buggyOutputTests": [
          {
            "buggyFunctionName": "AuxiliaryCode.reverseWordsCollapsingSpaces",
            "messages": [
              "Look at the spaces in your output for \"a  b\". Are there as many as in the input?",
              "Splitting on whitespace throws the extra spaces away. How could you keep them?",
            ],
          },
        ],
        "performanceTests": [
          {
            "inputDataAtom": "ab ",
            "transformationFunctionName": "System.extendString",
            "expectedPerformance": "linear",
            "evaluationFunctionName": "reverseWords",
          },
        ],
        "languageSpecificTips": {
          "python": [
            {
              "regexString": "\\.split\\(\\)",
              "message": "Calling split() without arguments merges runs of whitespace. Think about how to keep track of the spaces instead.",
            },
          ],
        },
      },
    ],
  }))?;

  Ok(vec![reverse_words])
}
