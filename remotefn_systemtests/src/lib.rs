// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT
