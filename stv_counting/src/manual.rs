/*!

This is the long-form manual for `stv_counting` and `wardcount`.

## Ballot file format

The input is a plain-text, line-oriented file, one file per ward:

```text
<ward name>
<seats> <no_candidates> <no_data_lines> <electorate> <votes_cast> <rejected_votes>
<name_1>,<party_1>,<successful_1>
...
<name_N>,<party_N>,<successful_N>
<weight> <pref_1> <pref_2> ... <pref_k> 0
...
```

Notes on the format:

- The second line carries exactly six integers, in that order.
- Candidate numbering is assigned sequentially starting at 1, in file
  order. The file itself never carries candidate numbers.
- The `successful` flag is `1` for true and anything else for false. It
  records the officially declared result and is informational only: the
  count never consults it.
- An empty party field means the candidate stands without a party code.
- Each voting pattern row starts with a weight (the number of identical
  papers it represents, at least 1), followed by that paper's ranked
  preferences as candidate numbers, and is terminated by a `0` sentinel.
  The sentinel is required and is stripped at parse time.
- A row consisting of only a weight and the sentinel is valid: it is a
  paper carrying no usable preference, counted as a non-transferable
  loss from the start.

The number of valid votes is `votes_cast - rejected_votes` and the Droop
quota is `valid_votes / (seats + 1) + 1` in integer arithmetic, computed
once at load time.

## Counting

Stage 1 credits each paper's full weight to its first preference. Then,
until the seats are filled, each stage performs exactly one action:

- if the highest-total continuing candidate sits strictly above quota,
  its surplus is transferred: every transferable paper whose first
  preference is that candidate moves `weight * transfer_weight` votes to
  its next usable preference, where `transfer_weight = surplus /
  (total - non_transferable)` rounded to 5 decimal places;
- otherwise the lowest-total continuing candidate is eliminated and each
  of its papers moves at its full, unweighted value.

A paper's *next usable preference* is the first candidate in its ranked
list that is not the transfer source, not already elected, and not
eliminated. Papers with no usable preference left become non-transferable
losses; they are reported, never treated as errors.

All fractional arithmetic is rounded to 5 decimal places after every
addition, not only at the end, matching how hand-counted returns are
published.

## Quick start

Tabulate a ward and print the outcome:

```bash
wardcount -i Torry-Ferryhill.dat
```

Write the per-stage summary as JSON:

```bash
wardcount -i Torry-Ferryhill.dat --out summary.json
```

Check the computed summary against a known-good reference (the program
exits with an error and prints a diff if they differ):

```bash
wardcount -i Torry-Ferryhill.dat --reference expected_summary.json
```

## Configuration

The source data defines no rule for breaking ties between candidates
with equal totals, so the policy is explicit:

- the default (`--tiebreak candidate-number`) selects the lowest
  candidate number, an arbitrary but reproducible choice;
- `--tiebreak random --random-seed N` orders tied candidates by a
  cryptographic hash over the seed, the stage number and the candidate
  name: a deterministic drawing of lots that can be re-run bit for bit.

Library users pass the same choice through
[`CountRules`](crate::CountRules).

*/
